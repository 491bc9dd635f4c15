//! Structured logging setup.
//!
//! Uses `tracing` + `tracing-subscriber` with environment-based filtering.
//! The JSON output format matches what log aggregation expects from the
//! other services on the bus; the compact format is for interactive use.

use crate::config::Settings;
use crate::error::{CamError, CamResult};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber from settings.
///
/// `RUST_LOG` overrides the configured level when present.
pub fn init(settings: &Settings) -> CamResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| CamError::Configuration(format!("invalid log level: {e}")))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let result = if settings.log_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    result.map_err(|e| CamError::Configuration(format!("failed to install logger: {e}")))
}
