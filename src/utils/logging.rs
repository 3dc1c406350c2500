use tracing_subscriber::EnvFilter;

/// Overrides the configured level, in `EnvFilter` syntax
pub(crate) const LOG_ENV_VAR: &str = "LLMROUTE_LOG";

/// Installs the stderr subscriber. Diagnostics never mix with completions
/// written to stdout.
pub(crate) fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_level));

    // Only fails if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
