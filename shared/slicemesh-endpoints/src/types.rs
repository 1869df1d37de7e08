//! Endpoint, partition and service model types

use serde::{Deserialize, Serialize};
use slicemesh_core::{Hostname, NamespacedName, PartitionId, SliceMeshError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Label naming the service that owns a partition
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Label present on partitions mirrored for multi-cluster services; those are never
/// attributed to a local service.
pub const MCS_SERVICE_NAME_LABEL: &str = "multicluster.kubernetes.io/service-name";

/// Address family of every address in a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    IPv4,
    IPv6,
    #[serde(rename = "FQDN")]
    Fqdn,
}

impl AddressType {
    pub fn is_ip(&self) -> bool {
        matches!(self, Self::IPv4 | Self::IPv6)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

/// Conditions reported for one partition entry. `None` means the source did not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConditions {
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub serving: Option<bool>,
    #[serde(default)]
    pub terminating: Option<bool>,
}

/// Reference to the object backing an entry, usually a pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl TargetRef {
    pub fn is_pod(&self) -> bool {
        self.kind == "Pod"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub addresses: Vec<String>,
    #[serde(default)]
    pub conditions: EndpointConditions,
    #[serde(default)]
    pub target_ref: Option<TargetRef>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

/// Port declared by a partition. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
}

/// One independently updated subset of a service's endpoints, already validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: PartitionId,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub address_type: AddressType,
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

impl Partition {
    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.0.clone())
    }

    pub fn service_name(&self) -> Option<&str> {
        self.labels.get(SERVICE_NAME_LABEL).map(String::as_str)
    }

    pub fn is_multicluster(&self) -> bool {
        self.labels.contains_key(MCS_SERVICE_NAME_LABEL)
    }

    /// The service this partition belongs to, if it carries the owner label.
    pub fn owner(&self) -> Option<NamespacedName> {
        self.service_name()
            .filter(|name| !name.is_empty())
            .map(|name| NamespacedName::new(self.namespace.clone(), name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Logical service as known to the service directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub hostname: Hostname,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Service {
    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }

    pub fn port_by_name(&self, name: &str) -> Option<&ServicePort> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn port_by_number(&self, port: u16) -> Option<&ServicePort> {
        self.ports.iter().find(|p| p.port == port)
    }

    /// Value of a label, treating an empty value as absent.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Whether an endpoint may be exposed outside its own cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverabilityPolicy {
    #[default]
    AlwaysDiscoverable,
    ClusterLocal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Unhealthy,
    Draining,
}

/// Workload an address resolves to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
}

/// Unit stored in and returned by the aggregation cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEndpoint {
    pub address: String,
    pub service_port_name: String,
    pub endpoint_port: u32,
    pub health_status: HealthStatus,
    pub discoverability: DiscoverabilityPolicy,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub workload_name: Option<String>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Endpoint together with the declared service port and service it was found under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub endpoint: CanonicalEndpoint,
    pub service_port: ServicePort,
    pub service: Arc<Service>,
}

/// Sidecar proxy asking for the instances co-located with it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    pub ip_addresses: Vec<String>,
    pub namespace: String,
}

/// Partition listing failures
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Partition source unavailable: {0}")]
    Unavailable(String),

    #[error("Partition listing failed for namespace {namespace}: {message}")]
    List { namespace: String, message: String },
}

impl From<SourceError> for SliceMeshError {
    fn from(err: SourceError) -> Self {
        SliceMeshError::Source(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition_with_labels(labels: &[(&str, &str)]) -> Partition {
        Partition {
            name: PartitionId::from("reviews-x7k2p"),
            namespace: "default".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            address_type: AddressType::IPv4,
            endpoints: vec![],
            ports: vec![],
        }
    }

    #[test]
    fn test_partition_owner_from_label() {
        let partition = partition_with_labels(&[(SERVICE_NAME_LABEL, "reviews")]);
        assert_eq!(
            partition.owner(),
            Some(NamespacedName::new("default", "reviews"))
        );
        assert!(!partition.is_multicluster());

        let orphan = partition_with_labels(&[]);
        assert!(orphan.owner().is_none());
    }

    #[test]
    fn test_multicluster_partition_detected() {
        let partition = partition_with_labels(&[
            (SERVICE_NAME_LABEL, "reviews"),
            (MCS_SERVICE_NAME_LABEL, "reviews"),
        ]);
        assert!(partition.is_multicluster());
    }

    #[test]
    fn test_service_label_ignores_empty_value() {
        let mut service = Service {
            hostname: Hostname::from("reviews.default.svc.cluster.local"),
            name: "reviews".to_string(),
            namespace: "default".to_string(),
            ports: vec![ServicePort {
                name: "http".to_string(),
                port: 9080,
                protocol: Protocol::Tcp,
            }],
            labels: BTreeMap::new(),
        };
        service.labels.insert("sticky".to_string(), String::new());
        assert!(service.label("sticky").is_none());
        assert_eq!(
            service.port_by_number(9080).map(|p| p.name.as_str()),
            Some("http")
        );
        assert!(service.port_by_name("grpc").is_none());
    }

    #[test]
    fn test_address_type_wire_names() {
        let fqdn: AddressType = serde_json::from_str("\"FQDN\"").unwrap();
        assert_eq!(fqdn, AddressType::Fqdn);
        assert!(!fqdn.is_ip());
        let v6: AddressType = serde_json::from_str("\"IPv6\"").unwrap();
        assert!(v6.is_ip());
    }
}
