//! Structured logging setup, installed once at process start.

use crate::shared::errors::AppResult;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global `tracing` subscriber. `json` selects the
/// machine-readable formatter (for log aggregation); otherwise a compact
/// human-readable formatter is installed. Honors `RUST_LOG`, defaulting
/// to `info`.
pub fn init_logger(json: bool) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()?;
    }
    Ok(())
}
