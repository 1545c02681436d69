use crate::config::LogFormat;
use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber for the binaries. `RUST_LOG` wins over
/// `default_level`. Library code logs through the `log` facade, which the
/// subscriber picks up. Output goes to stderr so CSV/OFX on stdout stays clean.
pub fn init_logging(format: LogFormat, default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
