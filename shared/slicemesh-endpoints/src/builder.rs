//! Canonical endpoint construction

use crate::types::{
    CanonicalEndpoint, DiscoverabilityPolicy, EndpointEntry, HealthStatus, WorkloadIdentity,
};

/// Builds endpoints enriched from one (optional) workload identity
pub struct EndpointBuilder<'a> {
    identity: Option<&'a WorkloadIdentity>,
    entry: Option<&'a EndpointEntry>,
}

impl<'a> EndpointBuilder<'a> {
    pub fn new(identity: Option<&'a WorkloadIdentity>) -> Self {
        Self {
            identity,
            entry: None,
        }
    }

    /// Use the entry's node, zone and hostname where the identity has none.
    pub fn with_entry(mut self, entry: &'a EndpointEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Build a healthy endpoint; callers override the status after classification.
    pub fn build(
        &self,
        address: &str,
        endpoint_port: i32,
        service_port_name: &str,
        discoverability: DiscoverabilityPolicy,
    ) -> CanonicalEndpoint {
        let identity = self.identity;
        let entry = self.entry;

        CanonicalEndpoint {
            address: address.to_string(),
            service_port_name: service_port_name.to_string(),
            endpoint_port: u32::try_from(endpoint_port).unwrap_or(0),
            health_status: HealthStatus::Healthy,
            discoverability,
            namespace: identity.map(|w| w.namespace.clone()),
            workload_name: identity.map(|w| w.name.clone()),
            service_account: identity.and_then(|w| w.service_account.clone()),
            labels: identity.map(|w| w.labels.clone()).unwrap_or_default(),
            node_name: identity
                .and_then(|w| w.node_name.clone())
                .or_else(|| entry.and_then(|e| e.node_name.clone())),
            locality: identity
                .and_then(|w| w.locality.clone())
                .or_else(|| entry.and_then(|e| e.zone.clone())),
            hostname: entry.and_then(|e| e.hostname.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_enrichment() {
        let identity = WorkloadIdentity {
            name: "reviews-v1-0".to_string(),
            namespace: "default".to_string(),
            service_account: Some("bookinfo-reviews".to_string()),
            locality: Some("us-east-1a".to_string()),
            ..Default::default()
        };
        let entry = EndpointEntry {
            addresses: vec!["10.0.0.5".to_string()],
            node_name: Some("node-a".to_string()),
            zone: Some("ignored-zone".to_string()),
            ..Default::default()
        };

        let ep = EndpointBuilder::new(Some(&identity))
            .with_entry(&entry)
            .build("10.0.0.5", 9080, "http", DiscoverabilityPolicy::AlwaysDiscoverable);

        assert_eq!(ep.endpoint_port, 9080);
        assert_eq!(ep.workload_name.as_deref(), Some("reviews-v1-0"));
        assert_eq!(ep.service_account.as_deref(), Some("bookinfo-reviews"));
        assert_eq!(ep.locality.as_deref(), Some("us-east-1a"));
        assert_eq!(ep.node_name.as_deref(), Some("node-a"));
        assert_eq!(ep.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn test_without_identity() {
        let ep = EndpointBuilder::new(None).build(
            "10.0.0.9",
            -1,
            "",
            DiscoverabilityPolicy::ClusterLocal,
        );
        assert_eq!(ep.endpoint_port, 0);
        assert!(ep.namespace.is_none());
        assert!(ep.labels.is_empty());
        assert_eq!(ep.discoverability, DiscoverabilityPolicy::ClusterLocal);
    }
}
