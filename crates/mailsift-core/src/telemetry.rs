use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to set tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Initialize structured logging, RUST_LOG driven. JSON output is used for
/// production; pretty output for dev.
pub fn init_logging(app: &AppConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;

    let result = if app.env.eq_ignore_ascii_case("dev") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .pretty()
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .try_init()
    };

    result.map_err(|err| TelemetryError::SubscriberInit(err.to_string()))
}
