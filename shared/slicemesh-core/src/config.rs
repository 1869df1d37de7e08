//! Configuration management for control-plane microservices

use crate::error::{Result, SliceMeshError};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_port: u16,
    pub cluster_id: String,
    /// Hostname suffixes whose endpoints are never exposed outside this cluster.
    pub cluster_local_suffixes: Vec<String>,
    pub features: FeatureFlags,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let http_port = lookup("HTTP_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|e| SliceMeshError::Config(format!("Invalid HTTP_PORT: {}", e)))?;

        Ok(Self {
            service_name: lookup("SERVICE_NAME")
                .unwrap_or_else(|| "endpoint-controller".to_string()),
            http_port,
            cluster_id: lookup("CLUSTER_ID").unwrap_or_else(|| "Kubernetes".to_string()),
            cluster_local_suffixes: lookup("CLUSTER_LOCAL_SUFFIXES")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            features: FeatureFlags::from_lookup(&lookup)?,
        })
    }
}

/// Toggles that change how partition entries are classified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeatureFlags {
    /// Keep not-ready entries in the merged view, marked unhealthy.
    pub send_unhealthy_endpoints: bool,
    /// Service label that opts a service into draining tracking. Empty disables it.
    pub persistent_session_label: String,
}

impl FeatureFlags {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let send_unhealthy_endpoints = match lookup("SEND_UNHEALTHY_ENDPOINTS") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                SliceMeshError::Config(format!("Invalid SEND_UNHEALTHY_ENDPOINTS: {}", raw))
            })?,
            None => false,
        };

        Ok(Self {
            send_unhealthy_endpoints,
            persistent_session_label: lookup("PERSISTENT_SESSION_LABEL").unwrap_or_default(),
        })
    }

    pub fn persistent_sessions_enabled(&self) -> bool {
        !self.persistent_session_label.is_empty()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Comma separated list, blanks dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.service_name, "endpoint-controller");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.cluster_id, "Kubernetes");
        assert!(config.cluster_local_suffixes.is_empty());
        assert!(!config.features.send_unhealthy_endpoints);
        assert!(!config.features.persistent_sessions_enabled());
    }

    #[test]
    fn test_cluster_local_suffixes_split() {
        let config = ServiceConfig::from_lookup(lookup_from(&[(
            "CLUSTER_LOCAL_SUFFIXES",
            " .kube-system.svc.cluster.local, ,.internal ",
        )]))
        .unwrap();
        assert_eq!(
            config.cluster_local_suffixes,
            vec![".kube-system.svc.cluster.local", ".internal"]
        );
    }

    #[test]
    fn test_feature_flags_parsed() {
        let flags = FeatureFlags::from_lookup(lookup_from(&[
            ("SEND_UNHEALTHY_ENDPOINTS", "1"),
            ("PERSISTENT_SESSION_LABEL", "slicemesh.io/persistent-session"),
        ]))
        .unwrap();
        assert!(flags.send_unhealthy_endpoints);
        assert_eq!(
            flags.persistent_session_label,
            "slicemesh.io/persistent-session"
        );
        assert!(flags.persistent_sessions_enabled());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err =
            ServiceConfig::from_lookup(lookup_from(&[("HTTP_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, SliceMeshError::Config(_)));

        let err = FeatureFlags::from_lookup(lookup_from(&[("SEND_UNHEALTHY_ENDPOINTS", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("SEND_UNHEALTHY_ENDPOINTS"));
    }
}
