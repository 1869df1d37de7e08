//! Per-partition endpoint aggregation
//!
//! Each service's endpoints are kept per partition so that one partition can be
//! replaced without touching the others. Reads flatten and deduplicate.

use parking_lot::RwLock;
use slicemesh_core::{Hostname, PartitionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::types::CanonicalEndpoint;

/// Identifies an endpoint by address and service port name across partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EndpointKey<'a> {
    address: &'a str,
    port: &'a str,
}

type PartitionEndpoints = HashMap<PartitionId, Vec<Arc<CanonicalEndpoint>>>;

/// Thread-safe store of every service's per-partition contributions
#[derive(Default)]
pub struct SliceAggregationCache {
    endpoints_by_service_and_partition: RwLock<HashMap<Hostname, PartitionEndpoints>>,
}

impl SliceAggregationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the partition's whole contribution. An empty list removes it.
    pub fn update(
        &self,
        hostname: &Hostname,
        partition: &PartitionId,
        endpoints: Vec<CanonicalEndpoint>,
    ) {
        if endpoints.is_empty() {
            self.delete(hostname, partition);
            return;
        }

        let endpoints = endpoints.into_iter().map(Arc::new).collect();
        let mut services = self.endpoints_by_service_and_partition.write();
        // Always overwrite. A key also present in another partition means the endpoint
        // is moving between partitions; Get keeps only one of them.
        services
            .entry(hostname.clone())
            .or_default()
            .insert(partition.clone(), endpoints);
    }

    /// Remove the partition, and the service once it has no partitions left.
    pub fn delete(&self, hostname: &Hostname, partition: &PartitionId) {
        let mut services = self.endpoints_by_service_and_partition.write();
        if let Some(partitions) = services.get_mut(hostname) {
            partitions.remove(partition);
            if partitions.is_empty() {
                services.remove(hostname);
            }
        }
    }

    /// Remove every partition recorded for the service.
    pub fn remove_service(&self, hostname: &Hostname) -> bool {
        self.endpoints_by_service_and_partition
            .write()
            .remove(hostname)
            .is_some()
    }

    /// Flattened endpoints of every partition, at most one per (address, port name).
    ///
    /// When partitions overlap, the first copy met while walking the partition
    /// `HashMap` survives, so the winner depends on its iteration order.
    pub fn get(&self, hostname: &Hostname) -> Vec<Arc<CanonicalEndpoint>> {
        let services = self.endpoints_by_service_and_partition.read();
        let Some(partitions) = services.get(hostname) else {
            return Vec::new();
        };

        let mut found = HashSet::new();
        let mut endpoints = Vec::new();
        for ep in partitions.values().flatten() {
            let key = EndpointKey {
                address: &ep.address,
                port: &ep.service_port_name,
            };
            if found.insert(key) {
                endpoints.push(Arc::clone(ep));
            }
        }
        endpoints
    }

    pub fn has(&self, hostname: &Hostname) -> bool {
        self.endpoints_by_service_and_partition
            .read()
            .contains_key(hostname)
    }

    pub fn services(&self) -> Vec<Hostname> {
        self.endpoints_by_service_and_partition
            .read()
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints_by_service_and_partition.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
