//! Point queries answered straight from the listed partitions
//!
//! Neither query goes through the aggregation cache: they need the declared service
//! port next to each endpoint, and they return every occurrence, so an endpoint listed
//! by two partitions is reported twice.

use std::sync::Arc;
use tracing::{error, info};

use crate::builder::EndpointBuilder;
use crate::source::{
    IdentityResolver, MetricsSink, PartitionSelector, PartitionSource, ServiceDirectory,
};
use crate::types::{Partition, Proxy, Service, ServiceInstance};

pub struct ServiceInstanceResolver {
    partitions: Arc<dyn PartitionSource>,
    services: Arc<dyn ServiceDirectory>,
    identities: Arc<dyn IdentityResolver>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ServiceInstanceResolver {
    pub fn new(
        partitions: Arc<dyn PartitionSource>,
        services: Arc<dyn ServiceDirectory>,
        identities: Arc<dyn IdentityResolver>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            partitions,
            services,
            identities,
            metrics,
        }
    }

    /// Instances whose address is one of the proxy's addresses, in the proxy's namespace.
    pub fn instances_for_proxy(&self, proxy: &Proxy) -> Vec<ServiceInstance> {
        let all = PartitionSelector::All;
        let partitions = match self.partitions.list(&proxy.namespace, &all) {
            Ok(partitions) => partitions,
            Err(e) => {
                error!(proxy = %proxy.id, "Listing partitions by namespace failed: {}", e);
                return Vec::new();
            }
        };

        partitions
            .iter()
            .flat_map(|partition| self.partition_instances_for_proxy(partition, proxy))
            .collect()
    }

    fn partition_instances_for_proxy(
        &self,
        partition: &Partition,
        proxy: &Proxy,
    ) -> Vec<ServiceInstance> {
        let mut out = Vec::new();
        if !partition.address_type.is_ip() {
            return out;
        }
        let Some(owner) = partition.owner() else {
            return out;
        };

        for service in self.services.services_for(&owner) {
            let identity = self.identities.identity_for_proxy(proxy);
            let builder = EndpointBuilder::new(identity.as_deref());
            let discoverability = self.services.discoverability_policy(&service);

            for port in &partition.ports {
                let (Some(port_name), Some(port_number)) = (port.name.as_deref(), port.port) else {
                    continue;
                };
                let Some(service_port) = service.port_by_name(port_name) else {
                    continue;
                };

                // A proxy may own several addresses (dual stack).
                for ip in &proxy.ip_addresses {
                    for entry in &partition.endpoints {
                        for address in entry.addresses.iter().filter(|a| *a == ip) {
                            let endpoint = builder.build(
                                address,
                                port_number,
                                &service_port.name,
                                discoverability,
                            );
                            out.push(ServiceInstance {
                                endpoint,
                                service_port: service_port.clone(),
                                service: Arc::clone(&service),
                            });
                            if entry.conditions.ready == Some(false) {
                                if let Some(metrics) = &self.metrics {
                                    metrics.endpoint_not_ready(&proxy.id);
                                }
                            }
                        }
                    }
                }
            }
        }

        out
    }

    /// Instances of the service behind the declared port `port`.
    pub fn instances_by_port(&self, service: &Arc<Service>, port: u16) -> Vec<ServiceInstance> {
        let selector = PartitionSelector::Service(service.name.clone());
        let partitions = match self.partitions.list(&service.namespace, &selector) {
            Ok(partitions) => partitions,
            Err(e) => {
                info!(
                    service = %service.name,
                    namespace = %service.namespace,
                    "Listing partitions failed: {}", e
                );
                return Vec::new();
            }
        };
        if partitions.is_empty() {
            return Vec::new();
        }

        let Some(service_port) = service.port_by_number(port) else {
            return Vec::new();
        };
        let discoverability = self.services.discoverability_policy(service);

        let mut out = Vec::new();
        for partition in partitions.iter().filter(|p| p.address_type.is_ip()) {
            let partition_key = partition.key();
            for entry in &partition.endpoints {
                for address in &entry.addresses {
                    let resolution = self.identities.resolve(
                        address,
                        &partition_key,
                        entry.target_ref.as_ref(),
                        &service.hostname,
                    );
                    if resolution.should_skip() {
                        continue;
                    }

                    let builder =
                        EndpointBuilder::new(resolution.identity.as_deref()).with_entry(entry);
                    // Partition ports carry the service port name; unnamed ports match any.
                    for partition_port in &partition.ports {
                        let matches = partition_port
                            .name
                            .as_deref()
                            .map_or(true, |name| name == service_port.name);
                        if !matches {
                            continue;
                        }
                        let endpoint = builder.build(
                            address,
                            partition_port.port.unwrap_or(0),
                            &service_port.name,
                            discoverability,
                        );
                        out.push(ServiceInstance {
                            endpoint,
                            service_port: service_port.clone(),
                            service: Arc::clone(service),
                        });
                    }
                }
            }
        }
        out
    }
}
