use clap::{Parser, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Auto,
    Cohere,
    Gemini,
    Openai,
    Anthropic,
    Deepseek,
    Groq,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamMode {
    /// Leader delegates to members and writes the final answer.
    Coordinate,
    /// Every member answers in parallel, then the leader synthesises.
    Collaborate,
}

pub fn team_mode_label(mode: TeamMode) -> &'static str {
    match mode {
        TeamMode::Coordinate => "coordinate",
        TeamMode::Collaborate => "collaborate",
    }
}

const CLI_EXAMPLES: &str = "Examples:\n\
  smallbiz-team\n\
  DEBUG_MODE=false smallbiz-team --provider cohere\n\
  smallbiz-team --team-mode collaborate --db-file tmp/agent.db\n\
\n\
Type 'exit' at the prompt to quit.";

#[derive(Debug, Parser)]
#[command(name = "smallbiz-team")]
#[command(about = "Advisor team for Canadian small businesses, built on ADK-Rust")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "SMB_PROVIDER", value_enum)]
    pub provider: Option<Provider>,

    #[arg(long, env = "SMB_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "SMB_CONFIG", default_value = ".smallbiz/config.toml")]
    pub config_path: String,

    #[arg(long, env = "SMB_DB_FILE")]
    pub db_file: Option<String>,

    #[arg(long, env = "SMB_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long, env = "SMB_SESSION_ID")]
    pub session_id: Option<String>,

    #[arg(long, env = "SMB_TEAM_MODE", value_enum)]
    pub team_mode: Option<TeamMode>,

    #[arg(long, env = "SMB_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "SMB_SHOW_SENSITIVE_CONFIG", default_value_t = false)]
    pub show_sensitive_config: bool,
}
