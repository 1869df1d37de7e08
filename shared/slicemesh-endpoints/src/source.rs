//! Collaborator interfaces consumed by the endpoint core
//!
//! All lookups are expected to be cheap, local and non-blocking; the core never
//! retries or times them out.

use slicemesh_core::{Hostname, NamespacedName};
use std::sync::Arc;

use crate::types::{
    DiscoverabilityPolicy, Partition, Proxy, Service, SourceError, TargetRef, WorkloadIdentity,
};

/// Which partitions of a namespace a listing should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSelector {
    /// Every locally owned partition in the namespace.
    All,
    /// Partitions labelled as belonging to the named service.
    Service(String),
}

impl PartitionSelector {
    /// Multi-cluster partitions never match.
    pub fn matches(&self, partition: &Partition) -> bool {
        if partition.is_multicluster() {
            return false;
        }
        match self {
            Self::All => true,
            Self::Service(name) => partition.service_name() == Some(name.as_str()),
        }
    }
}

/// Lists the partitions currently known for a namespace
pub trait PartitionSource: Send + Sync {
    fn list(
        &self,
        namespace: &str,
        selector: &PartitionSelector,
    ) -> Result<Vec<Arc<Partition>>, SourceError>;
}

/// Declared service metadata
pub trait ServiceDirectory: Send + Sync {
    fn get_service(&self, hostname: &Hostname) -> Option<Arc<Service>>;

    /// Every service (one per hostname) backed by the given namespaced name.
    fn services_for(&self, name: &NamespacedName) -> Vec<Arc<Service>>;

    fn discoverability_policy(&self, service: &Service) -> DiscoverabilityPolicy;
}

/// Outcome of resolving one address
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub identity: Option<Arc<WorkloadIdentity>>,
    /// The resolver knows the address should map to a workload. When this is set and
    /// `identity` is empty, the workload has not been observed yet.
    pub expected: bool,
}

impl Resolution {
    pub fn found(identity: Arc<WorkloadIdentity>) -> Self {
        Self {
            identity: Some(identity),
            expected: true,
        }
    }

    pub fn missing() -> Self {
        Self {
            identity: None,
            expected: true,
        }
    }

    /// Expected but absent: the address should be left out until the next delivery.
    pub fn should_skip(&self) -> bool {
        self.expected && self.identity.is_none()
    }
}

/// Maps raw addresses to workload identities
pub trait IdentityResolver: Send + Sync {
    fn resolve(
        &self,
        address: &str,
        partition: &NamespacedName,
        target_ref: Option<&TargetRef>,
        hostname: &Hostname,
    ) -> Resolution;

    fn identity_for_proxy(&self, proxy: &Proxy) -> Option<Arc<WorkloadIdentity>>;

    /// Called for every address of a removed partition.
    fn endpoint_deleted(&self, _partition: &NamespacedName, _address: &str) {}
}

/// Receives not-ready events observed on the proxy query path
pub trait MetricsSink: Send + Sync {
    fn endpoint_not_ready(&self, proxy_id: &str);
}
