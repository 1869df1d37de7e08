//! Controller facade tying change notifications, the cache and point queries together

use slicemesh_core::{FeatureFlags, Hostname, NamespacedName};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::SliceAggregationCache;
use crate::processor::EndpointSliceProcessor;
use crate::resolver::ServiceInstanceResolver;
use crate::source::{
    IdentityResolver, MetricsSink, PartitionSelector, PartitionSource, ServiceDirectory,
};
use crate::types::{CanonicalEndpoint, Partition, Proxy, ServiceInstance};

/// Merged endpoint views of the services touched by one notification
pub type AffectedServices = HashMap<Hostname, Vec<Arc<CanonicalEndpoint>>>;

/// Owns the aggregation cache and answers every endpoint query for the mesh
pub struct EndpointSliceController {
    cache: SliceAggregationCache,
    processor: EndpointSliceProcessor,
    resolver: ServiceInstanceResolver,
    partitions: Arc<dyn PartitionSource>,
    services: Arc<dyn ServiceDirectory>,
    identities: Arc<dyn IdentityResolver>,
}

impl EndpointSliceController {
    pub fn new(
        partitions: Arc<dyn PartitionSource>,
        services: Arc<dyn ServiceDirectory>,
        identities: Arc<dyn IdentityResolver>,
        metrics: Option<Arc<dyn MetricsSink>>,
        flags: FeatureFlags,
    ) -> Self {
        Self {
            cache: SliceAggregationCache::new(),
            processor: EndpointSliceProcessor::new(Arc::clone(&identities), flags),
            resolver: ServiceInstanceResolver::new(
                Arc::clone(&partitions),
                Arc::clone(&services),
                Arc::clone(&identities),
                metrics,
            ),
            partitions,
            services,
            identities,
        }
    }

    pub fn cache(&self) -> &SliceAggregationCache {
        &self.cache
    }

    /// Reprocess a partition for every service it backs.
    pub fn on_partition_changed(&self, partition: &Partition) -> AffectedServices {
        let mut affected = AffectedServices::new();
        let Some(owner) = self.local_owner(partition) else {
            return affected;
        };

        for service in self.services.services_for(&owner) {
            let discoverability = self.services.discoverability_policy(&service);
            let count = self.processor.process(
                &self.cache,
                &service.hostname,
                Some(&service),
                discoverability,
                partition,
            );
            debug!(
                hostname = %service.hostname,
                partition = %partition.key(),
                endpoints = count,
                "Partition changed"
            );
            affected.insert(service.hostname.clone(), self.cache.get(&service.hostname));
        }
        affected
    }

    /// Drop a partition's contribution from every service it backed.
    pub fn on_partition_removed(&self, partition: &Partition) -> AffectedServices {
        let mut affected = AffectedServices::new();
        let key = partition.key();
        for entry in &partition.endpoints {
            for address in &entry.addresses {
                self.identities.endpoint_deleted(&key, address);
            }
        }

        // No multi-cluster check here: the partition may have been relabelled after
        // it contributed.
        let Some(owner) = partition.owner() else {
            return affected;
        };
        for service in self.services.services_for(&owner) {
            if !self.cache.has(&service.hostname) {
                continue;
            }
            self.cache.delete(&service.hostname, &partition.name);
            debug!(hostname = %service.hostname, partition = %key, "Partition removed");
            affected.insert(service.hostname.clone(), self.cache.get(&service.hostname));
        }
        affected
    }

    /// Forget every contribution recorded for a service that no longer exists.
    pub fn on_service_removed(&self, hostname: &Hostname) -> bool {
        let removed = self.cache.remove_service(hostname);
        if removed {
            info!(hostname = %hostname, "Dropped endpoints of removed service");
        }
        removed
    }

    /// Re-list one partition by key and reprocess it. Used when a workload it was
    /// waiting on shows up.
    pub fn resync_partition(&self, key: &NamespacedName) -> AffectedServices {
        let all = PartitionSelector::All;
        let partitions = match self.partitions.list(&key.namespace, &all) {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!(partition = %key, "Listing partitions for resync failed: {}", e);
                return AffectedServices::new();
            }
        };

        match partitions.iter().find(|p| p.name.as_str() == key.name) {
            Some(partition) => self.on_partition_changed(partition),
            None => {
                debug!(partition = %key, "Partition gone before resync");
                AffectedServices::new()
            }
        }
    }

    /// Re-list and reprocess every partition of a service, then return the merged view.
    pub fn rebuild_service(
        &self,
        name: &str,
        namespace: &str,
        hostname: &Hostname,
    ) -> Vec<Arc<CanonicalEndpoint>> {
        let selector = PartitionSelector::Service(name.to_string());
        let partitions = match self.partitions.list(namespace, &selector) {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!(service = %name, namespace = %namespace, "Listing partitions failed: {}", e);
                return self.cache.get(hostname);
            }
        };

        let service = self.services.get_service(hostname);
        let discoverability = service
            .as_deref()
            .map(|svc| self.services.discoverability_policy(svc))
            .unwrap_or_default();

        for partition in &partitions {
            self.processor.process(
                &self.cache,
                hostname,
                service.as_deref(),
                discoverability,
                partition,
            );
        }
        info!(
            hostname = %hostname,
            partitions = partitions.len(),
            "Rebuilt service endpoints"
        );
        self.cache.get(hostname)
    }

    pub fn get_endpoints(&self, hostname: &Hostname) -> Vec<Arc<CanonicalEndpoint>> {
        self.cache.get(hostname)
    }

    pub fn has_endpoints(&self, hostname: &Hostname) -> bool {
        self.cache.has(hostname)
    }

    /// Hostnames with at least one endpoint, sorted.
    pub fn hostnames(&self) -> Vec<Hostname> {
        let mut hostnames = self.cache.services();
        hostnames.sort();
        hostnames
    }

    pub fn service_instances_for_proxy(&self, proxy: &Proxy) -> Vec<ServiceInstance> {
        self.resolver.instances_for_proxy(proxy)
    }

    /// Instances behind a declared port of the service with this hostname.
    pub fn service_instances_by_port(
        &self,
        hostname: &Hostname,
        port: u16,
    ) -> Vec<ServiceInstance> {
        match self.services.get_service(hostname) {
            Some(service) => self.resolver.instances_by_port(&service, port),
            None => Vec::new(),
        }
    }

    fn local_owner(&self, partition: &Partition) -> Option<NamespacedName> {
        if partition.is_multicluster() {
            debug!(partition = %partition.key(), "Ignoring multi-cluster partition");
            return None;
        }
        partition.owner()
    }
}
