use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::{Cli, Provider, TeamMode};

pub const MODEL_ID: &str = "command-a-03-2025";
pub const DB_FILE: &str = "tmp/agent.db";
pub const SESSION_TABLE: &str = "agent_sessions";
pub const TEAM_MEMORY_TABLE: &str = "team_memories";
pub const AGENT_MEMORY_TABLE: &str = "agent_memories";
pub const NUM_HISTORY_RUNS: usize = 5;
pub const APP_NAME: &str = "smallbiz-team";
pub const DEFAULT_USER_ID: &str = "user";
pub const DEFAULT_SESSION_ID: &str = "default-session";

pub const ABOUT_TEAM: &str = "\
You are a part of a team of agents that helps support Canadian small businesses.
You are all working together to help the user become more successful with their business.
You ask lots of questions to understand the user's business and their needs.";

pub const DEBUG_MODE_ENV: &str = "DEBUG_MODE";

/// Debug mode is on unless the value is a case-insensitive "false".
/// Unset and unrecognized values fall back to the default of on.
pub fn parse_debug_mode(raw: Option<&str>) -> bool {
    !raw.is_some_and(|value| value.to_lowercase() == "false")
}

pub fn debug_mode_from_env() -> bool {
    parse_debug_mode(std::env::var(DEBUG_MODE_ENV).ok().as_deref())
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub config_path: String,
    pub provider: Provider,
    pub model: String,
    pub db_file: String,
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub team_mode: TeamMode,
    pub debug_mode: bool,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
    pub show_sensitive_config: bool,
}

impl RuntimeConfig {
    pub fn db_url(&self) -> String {
        sqlite_url_for_file(&self.db_file)
    }
}

pub fn sqlite_url_for_file(db_file: &str) -> String {
    if db_file.starts_with("sqlite:") {
        db_file.to_string()
    } else {
        format!("sqlite://{db_file}")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub db_file: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub team_mode: Option<TeamMode>,
    pub telemetry_path: Option<String>,
}

pub fn load_config_file(config_path: &str) -> Result<ConfigFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at '{}'", path.display()))?;
    toml::from_str::<ConfigFile>(&content).with_context(|| {
        format!(
            "invalid configuration in '{}'. Check provider/team_mode values and field names.",
            path.display()
        )
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn resolve_runtime_config(
    cli: &Cli,
    file: &ConfigFile,
    debug_mode: bool,
) -> Result<RuntimeConfig> {
    let defaults = &file.defaults;

    let model = non_empty(cli.model.as_ref())
        .or_else(|| non_empty(defaults.model.as_ref()))
        .unwrap_or_else(|| MODEL_ID.to_string());
    let db_file = non_empty(cli.db_file.as_ref())
        .or_else(|| non_empty(defaults.db_file.as_ref()))
        .unwrap_or_else(|| DB_FILE.to_string());
    let telemetry_path = non_empty(cli.telemetry_path.as_ref())
        .or_else(|| non_empty(defaults.telemetry_path.as_ref()));

    let session_id = non_empty(cli.session_id.as_ref())
        .or_else(|| non_empty(defaults.session_id.as_ref()))
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
    if session_id.contains(char::is_whitespace) {
        return Err(anyhow::anyhow!(
            "invalid value for session id '{}': whitespace is not allowed",
            session_id
        ));
    }

    Ok(RuntimeConfig {
        config_path: cli.config_path.clone(),
        provider: cli.provider.or(defaults.provider).unwrap_or(Provider::Auto),
        model,
        db_file,
        app_name: APP_NAME.to_string(),
        user_id: non_empty(cli.user_id.as_ref())
            .or_else(|| non_empty(defaults.user_id.as_ref()))
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        session_id,
        team_mode: cli
            .team_mode
            .or(defaults.team_mode)
            .unwrap_or(TeamMode::Coordinate),
        debug_mode,
        telemetry_enabled: telemetry_path.is_some(),
        telemetry_path: telemetry_path.unwrap_or_default(),
        show_sensitive_config: cli.show_sensitive_config,
    })
}
