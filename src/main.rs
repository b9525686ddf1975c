use std::io;

use anyhow::Result;
use clap::Parser;

use smallbiz_team::cli::Cli;
use smallbiz_team::config::{debug_mode_from_env, load_config_file, resolve_runtime_config};
use smallbiz_team::context::AppContext;
use smallbiz_team::error::{categorize_error, format_cli_error};
use smallbiz_team::logging::init_tracing;
use smallbiz_team::session_loop::run_session_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug_mode = debug_mode_from_env();
    let show_sensitive_config = cli.show_sensitive_config;

    if let Err(err) = run(cli, debug_mode).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive_config));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "session failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli, debug_mode: bool) -> Result<()> {
    init_tracing(debug_mode)?;

    tracing::info!("Setting constants...");
    let config_file = load_config_file(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &config_file, debug_mode)?;
    tracing::info!(
        model = %cfg.model,
        db_file = %cfg.db_file,
        debug_mode,
        "Constants setup complete ✅"
    );

    let ctx = AppContext::build(cfg).await?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_session_loop(&ctx, stdin.lock(), &mut stdout).await?;
    Ok(())
}
