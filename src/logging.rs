use crate::error::{ExtractError, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Default level for the crate's own events; `RUST_LOG` overrides it.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Installs the stderr fmt subscriber. Fails if a global subscriber is already set.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("s57_extract={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| ExtractError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })
}
