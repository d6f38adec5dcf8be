use anyhow::{anyhow, Context as _};
use tracing_subscriber::EnvFilter;

use crate::config::CyclerConfiguration;

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// Logs are filtered with the configured log level, and written to standard error, as standard output carries the
/// exported aggregates. They are formatted as JSON if configured to do so, or in a human-readable format otherwise.
///
/// # Errors
///
/// If the log level is invalid, or the logging subsystem was already initialized, an error is returned.
pub fn initialize_logging(config: &CyclerConfiguration) -> Result<(), anyhow::Error> {
    if config.log_level.is_empty() {
        return Err(anyhow!("Log level cannot be empty."));
    }

    let filter = EnvFilter::builder()
        .parse(&config.log_level)
        .context("Failed to parse valid log level.")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if config.log_format_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
