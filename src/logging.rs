use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub fn default_log_filter(debug_mode: bool) -> &'static str {
    if debug_mode { "debug" } else { "info" }
}

/// `RUST_LOG`, when set and non-empty, takes precedence over the debug-mode level.
pub fn resolve_log_filter(debug_mode: bool, rust_log: Option<&str>) -> String {
    rust_log
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_log_filter(debug_mode).to_string())
}

pub fn init_tracing(debug_mode: bool) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = resolve_log_filter(debug_mode, rust_log.as_deref());
    let env_filter = EnvFilter::try_new(&filter)
        .or_else(|_| EnvFilter::try_new(default_log_filter(debug_mode)))
        .map_err(|e| anyhow::anyhow!("failed to parse log filter '{filter}': {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_mode_selects_verbose_level() {
        assert_eq!(resolve_log_filter(true, None), "debug");
        assert_eq!(resolve_log_filter(false, None), "info");
    }

    #[test]
    fn rust_log_overrides_debug_mode() {
        assert_eq!(resolve_log_filter(true, Some("warn")), "warn");
        assert_eq!(resolve_log_filter(false, Some("  ")), "info");
    }
}
