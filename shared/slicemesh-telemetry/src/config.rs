//! Logging settings read from the environment

/// How the global subscriber filters and renders events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `info,slicemesh_endpoints=debug`.
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `RUST_LOG` wins over `LOG_LEVEL`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("RUST_LOG")
                .or_else(|| lookup("LOG_LEVEL"))
                .unwrap_or(defaults.log_level),
            json_logs: lookup("JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
        }
    }
}
