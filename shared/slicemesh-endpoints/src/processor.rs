//! Partition processing: health classification, identity enrichment and cache writes

use slicemesh_core::{FeatureFlags, Hostname};
use std::sync::Arc;
use tracing::debug;

use crate::builder::EndpointBuilder;
use crate::cache::SliceAggregationCache;
use crate::source::IdentityResolver;
use crate::types::{
    CanonicalEndpoint, DiscoverabilityPolicy, EndpointConditions, HealthStatus, Partition, Service,
};

/// Health signals derived from one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHealth {
    /// Readiness is true or unreported.
    pub ready: bool,
    /// Not ready but still serving, on a service that tracks persistent sessions.
    pub draining: bool,
}

impl EntryHealth {
    pub fn evaluate(
        conditions: &EndpointConditions,
        service: Option<&Service>,
        flags: &FeatureFlags,
    ) -> Self {
        let ready = conditions.ready.unwrap_or(true);
        // Draining is only tracked for services opted into persistent sessions.
        let draining = flags.persistent_sessions_enabled()
            && service
                .and_then(|svc| svc.label(&flags.persistent_session_label))
                .is_some()
            && conditions.serving == Some(true)
            && conditions.ready == Some(false);

        Self { ready, draining }
    }

    /// Status to publish, or `None` when the entry must be left out entirely.
    pub fn classify(&self, send_unhealthy_endpoints: bool) -> Option<HealthStatus> {
        if self.ready {
            Some(HealthStatus::Healthy)
        } else if self.draining {
            Some(HealthStatus::Draining)
        } else if send_unhealthy_endpoints {
            Some(HealthStatus::Unhealthy)
        } else {
            None
        }
    }
}

/// Turns one partition into canonical endpoints and stores them under its key
pub struct EndpointSliceProcessor {
    identities: Arc<dyn IdentityResolver>,
    flags: FeatureFlags,
}

impl EndpointSliceProcessor {
    pub fn new(identities: Arc<dyn IdentityResolver>, flags: FeatureFlags) -> Self {
        Self { identities, flags }
    }

    /// Canonical endpoints for the partition, in entry × address × port order.
    pub fn build_endpoints(
        &self,
        hostname: &Hostname,
        service: Option<&Service>,
        discoverability: DiscoverabilityPolicy,
        partition: &Partition,
    ) -> Vec<CanonicalEndpoint> {
        if !partition.address_type.is_ip() {
            debug!(
                hostname = %hostname,
                partition = %partition.name,
                address_type = ?partition.address_type,
                "Skipping partition with unsupported address type"
            );
            return Vec::new();
        }

        let partition_key = partition.key();
        let mut endpoints = Vec::new();

        for entry in &partition.endpoints {
            let health = EntryHealth::evaluate(&entry.conditions, service, &self.flags);
            let Some(status) = health.classify(self.flags.send_unhealthy_endpoints) else {
                continue;
            };

            for address in &entry.addresses {
                let resolution = self.identities.resolve(
                    address,
                    &partition_key,
                    entry.target_ref.as_ref(),
                    hostname,
                );
                if resolution.should_skip() {
                    // The workload has not been seen yet; the next delivery will include it.
                    debug!(
                        hostname = %hostname,
                        address = %address,
                        "Workload not yet known, skipping address"
                    );
                    continue;
                }

                let builder =
                    EndpointBuilder::new(resolution.identity.as_deref()).with_entry(entry);
                for port in &partition.ports {
                    let mut endpoint = builder.build(
                        address,
                        port.port.unwrap_or(0),
                        port.name.as_deref().unwrap_or(""),
                        discoverability,
                    );
                    endpoint.health_status = status;
                    endpoints.push(endpoint);
                }
            }
        }

        endpoints
    }

    /// Rebuild the partition's contribution and replace it in the cache.
    pub fn process(
        &self,
        cache: &SliceAggregationCache,
        hostname: &Hostname,
        service: Option<&Service>,
        discoverability: DiscoverabilityPolicy,
        partition: &Partition,
    ) -> usize {
        let endpoints = self.build_endpoints(hostname, service, discoverability, partition);
        let count = endpoints.len();
        debug!(
            hostname = %hostname,
            partition = %partition.name,
            endpoints = count,
            "Updating partition contribution"
        );
        cache.update(hostname, &partition.name, endpoints);
        count
    }
}
