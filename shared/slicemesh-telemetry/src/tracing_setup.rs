//! Global subscriber installation

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Parse the configured directives. A typo fails startup instead of silently logging nothing.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::InvalidFilter(format!("{:?}: {}", config.log_level, e)))
}

pub fn init_tracing(service_name: &str, config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    // Exactly one of the two layers is present.
    let json = config.json_logs.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
    });
    let text = (!config.json_logs).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = service_name,
        filter = %config.log_level,
        json_logs = config.json_logs,
        "Logging ready"
    );
    Ok(())
}
