//! Endpoint controller service state and lifecycle

use slicemesh_core::{
    DependencyStatus, HealthStatus, Hostname, NamespacedName, ReadinessStatus, Result,
    ServiceConfig, SliceMeshError, SliceMeshService,
};
use slicemesh_endpoints::registry::{
    CounterMetricsSink, PartitionStore, ServiceRegistry, WorkloadRegistry,
};
use slicemesh_endpoints::{
    AffectedServices, CanonicalEndpoint, EndpointSliceController, Partition, PartitionPayload,
    Service, WorkloadIdentity,
};
use slicemesh_telemetry::Gauge;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::api;

/// State shared between the HTTP handlers and the service lifecycle
pub struct ControllerState {
    controller: EndpointSliceController,
    partitions: Arc<PartitionStore>,
    services: Arc<ServiceRegistry>,
    workloads: Arc<WorkloadRegistry>,
    metrics: Arc<CounterMetricsSink>,
    cached_services: Gauge,
    start_time: Instant,
}

impl ControllerState {
    pub fn new(config: &ServiceConfig) -> Self {
        let partitions = Arc::new(PartitionStore::new());
        let services = Arc::new(ServiceRegistry::with_cluster_local_suffixes(
            config.cluster_local_suffixes.clone(),
        ));
        let workloads = Arc::new(WorkloadRegistry::new());
        let metrics = Arc::new(CounterMetricsSink::new());

        let controller = EndpointSliceController::new(
            partitions.clone(),
            services.clone(),
            workloads.clone(),
            Some(metrics.clone()),
            config.features.clone(),
        );

        Self {
            controller,
            partitions,
            services,
            workloads,
            metrics,
            cached_services: Gauge::new("cached_services"),
            start_time: Instant::now(),
        }
    }

    pub fn controller(&self) -> &EndpointSliceController {
        &self.controller
    }

    pub fn not_ready_total(&self) -> u64 {
        self.metrics.not_ready_total()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn readiness(&self) -> ReadinessStatus {
        ReadinessStatus {
            ready: true,
            dependencies: vec![
                DependencyStatus {
                    name: format!("partitions:{}", self.partitions.len()),
                    available: true,
                    latency_ms: None,
                },
                DependencyStatus {
                    name: format!("services:{}", self.services.len()),
                    available: true,
                    latency_ms: None,
                },
                DependencyStatus {
                    name: format!("pending_workloads:{}", self.workloads.pending_count()),
                    available: true,
                    latency_ms: None,
                },
                DependencyStatus {
                    name: format!(
                        "{}:{}",
                        self.cached_services.name(),
                        self.cached_services.get()
                    ),
                    available: true,
                    latency_ms: None,
                },
            ],
        }
    }

    fn record_cache_size(&self) {
        let cached = self.controller.cache().len() as u64;
        self.cached_services.set(cached);
    }

    /// Store a partition delivered under `namespace/name` and fold it into the cache.
    pub fn apply_partition(
        &self,
        namespace: &str,
        name: &str,
        mut payload: PartitionPayload,
    ) -> Result<AffectedServices> {
        let metadata = payload.metadata_mut();
        pin_to_path("name", &mut metadata.name, name)?;
        pin_to_path("namespace", &mut metadata.namespace, namespace)?;

        let partition = payload
            .into_partition()
            .map_err(|e| SliceMeshError::Validation(e.to_string()))?;

        let mut affected = AffectedServices::new();
        if let Some(previous) = self.partitions.apply(partition.clone()) {
            if lost_contribution(&previous, &partition) {
                affected.extend(self.controller.on_partition_removed(&previous));
            }
        }
        affected.extend(self.controller.on_partition_changed(&partition));
        self.record_cache_size();
        Ok(affected)
    }

    pub fn remove_partition(&self, namespace: &str, name: &str) -> Result<AffectedServices> {
        let key = NamespacedName::new(namespace, name);
        let partition = self
            .partitions
            .remove(&key)
            .ok_or_else(|| SliceMeshError::NotFound(format!("partition {}", key)))?;
        let affected = self.controller.on_partition_removed(&partition);
        self.record_cache_size();
        Ok(affected)
    }

    /// Register a service and rebuild its endpoints from the stored partitions.
    pub fn upsert_service(&self, service: Service) -> Result<Vec<Arc<CanonicalEndpoint>>> {
        if service.name.is_empty()
            || service.namespace.is_empty()
            || service.hostname.as_str().is_empty()
        {
            return Err(SliceMeshError::Validation(
                "service requires hostname, name and namespace".to_string(),
            ));
        }
        let service = self.services.upsert(service);
        info!(
            hostname = %service.hostname,
            ports = service.ports.len(),
            "Service registered"
        );
        let endpoints = self
            .controller
            .rebuild_service(&service.name, &service.namespace, &service.hostname);
        self.record_cache_size();
        Ok(endpoints)
    }

    /// Forget a service and every endpoint cached for it. Its partitions stay stored.
    pub fn remove_service(&self, hostname: &Hostname) -> Result<()> {
        self.services
            .remove(hostname)
            .ok_or_else(|| SliceMeshError::NotFound(format!("service {}", hostname)))?;
        self.controller.on_service_removed(hostname);
        self.record_cache_size();
        Ok(())
    }

    /// Register a workload and resync every partition that was waiting for it.
    pub fn upsert_workload(&self, identity: WorkloadIdentity) -> Result<AffectedServices> {
        if identity.name.is_empty() || identity.namespace.is_empty() {
            return Err(SliceMeshError::Validation(
                "workload requires name and namespace".to_string(),
            ));
        }

        let waiting: BTreeSet<NamespacedName> = self
            .workloads
            .upsert(identity)
            .into_iter()
            .map(|pending| pending.partition)
            .collect();

        let mut affected = AffectedServices::new();
        for key in &waiting {
            affected.extend(self.controller.resync_partition(key));
        }
        self.record_cache_size();
        Ok(affected)
    }

    /// Endpoints already built from this workload keep their enrichment until their
    /// partition is delivered again.
    pub fn remove_workload(&self, namespace: &str, name: &str) -> Result<()> {
        let key = NamespacedName::new(namespace, name);
        self.workloads
            .remove(&key)
            .ok_or_else(|| SliceMeshError::NotFound(format!("workload {}", key)))?;
        info!(workload = %key, "Workload removed");
        Ok(())
    }
}

/// The stored copy stops backing the services it fed: the owner label moved or the
/// partition became multi-cluster.
fn lost_contribution(previous: &Partition, current: &Partition) -> bool {
    previous.owner() != current.owner()
        || (current.is_multicluster() && !previous.is_multicluster())
}

/// Fill a missing metadata field from the request path, rejecting a conflicting one.
fn pin_to_path(field: &str, value: &mut Option<String>, expected: &str) -> Result<()> {
    if let Some(declared) = value.as_deref().filter(|d| !d.is_empty() && *d != expected) {
        return Err(SliceMeshError::Validation(format!(
            "metadata.{} {} does not match path {}",
            field, declared, expected
        )));
    }
    *value = Some(expected.to_string());
    Ok(())
}

pub struct EndpointControllerService {
    config: ServiceConfig,
    state: Arc<ControllerState>,
}

impl EndpointControllerService {
    pub fn new(config: ServiceConfig) -> Self {
        let state = Arc::new(ControllerState::new(&config));
        Self { config, state }
    }
}

#[async_trait::async_trait]
impl SliceMeshService for EndpointControllerService {
    fn service_id(&self) -> &'static str {
        "endpoint-controller"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.state.uptime_seconds(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        self.state.readiness()
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            services = self.state.controller().cache().len(),
            not_ready_observed = self.state.not_ready_total(),
            "Shutting down Endpoint Controller"
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let bind = format!("0.0.0.0:{}", self.config.http_port);
        info!(
            bind = %bind,
            cluster_id = %self.config.cluster_id,
            "Starting HTTP server"
        );

        let app = api::router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slicemesh_endpoints::DiscoverabilityPolicy;

    fn state(lookup: &[(&str, &str)]) -> ControllerState {
        let config = ServiceConfig::from_lookup(|key| {
            lookup
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        ControllerState::new(&config)
    }

    fn service(name: &str, namespace: &str) -> Service {
        serde_json::from_value(json!({
            "hostname": format!("{name}.{namespace}.svc.cluster.local"),
            "name": name,
            "namespace": namespace,
            "ports": [{"name": "http", "port": 9080}]
        }))
        .unwrap()
    }

    fn slice(labels: serde_json::Value, address: &str) -> PartitionPayload {
        serde_json::from_value(json!({
            "apiVersion": "discovery.k8s.io/v1",
            "metadata": {"labels": labels},
            "addressType": "IPv4",
            "endpoints": [{"addresses": [address]}],
            "ports": [{"name": "http", "port": 9080}]
        }))
        .unwrap()
    }

    fn reviews_host() -> Hostname {
        Hostname::from("reviews.default.svc.cluster.local")
    }

    #[test]
    fn test_multicluster_relabel_drops_local_contribution() {
        let state = state(&[]);
        state.upsert_service(service("reviews", "default")).unwrap();

        let owned = json!({"kubernetes.io/service-name": "reviews"});
        state
            .apply_partition("default", "reviews-a", slice(owned, "10.0.0.1"))
            .unwrap();
        assert!(state.controller().has_endpoints(&reviews_host()));

        let mirrored = json!({
            "kubernetes.io/service-name": "reviews",
            "multicluster.kubernetes.io/service-name": "reviews"
        });
        let affected = state
            .apply_partition("default", "reviews-a", slice(mirrored, "10.0.0.1"))
            .unwrap();
        assert!(affected[&reviews_host()].is_empty());
        assert!(!state.controller().has_endpoints(&reviews_host()));

        // Removing the mirrored copy leaves nothing behind either.
        state.remove_partition("default", "reviews-a").unwrap();
        assert!(state.controller().hostnames().is_empty());
    }

    #[test]
    fn test_owner_relabel_moves_partition() {
        let state = state(&[]);
        state.upsert_service(service("reviews", "default")).unwrap();
        state.upsert_service(service("ratings", "default")).unwrap();

        let reviews = json!({"kubernetes.io/service-name": "reviews"});
        state
            .apply_partition("default", "shared-a", slice(reviews, "10.0.0.1"))
            .unwrap();

        let ratings = json!({"kubernetes.io/service-name": "ratings"});
        state
            .apply_partition("default", "shared-a", slice(ratings, "10.0.0.1"))
            .unwrap();

        let ratings_host = Hostname::from("ratings.default.svc.cluster.local");
        assert!(!state.controller().has_endpoints(&reviews_host()));
        assert_eq!(state.controller().get_endpoints(&ratings_host).len(), 1);
    }

    fn pending_workloads(state: &ControllerState) -> String {
        state
            .readiness()
            .dependencies
            .into_iter()
            .map(|d| d.name)
            .find(|name| name.starts_with("pending_workloads:"))
            .unwrap()
    }

    #[test]
    fn test_readiness_reports_pending_workloads() {
        let state = state(&[]);
        state.upsert_service(service("reviews", "default")).unwrap();
        let payload = serde_json::from_value(json!({
            "apiVersion": "discovery.k8s.io/v1",
            "metadata": {"labels": {"kubernetes.io/service-name": "reviews"}},
            "addressType": "IPv4",
            "endpoints": [{
                "addresses": ["10.0.0.5"],
                "targetRef": {"kind": "Pod", "name": "reviews-v1-0", "namespace": "default"}
            }],
            "ports": [{"name": "http", "port": 9080}]
        }))
        .unwrap();
        state
            .apply_partition("default", "reviews-a", payload)
            .unwrap();
        assert_eq!(pending_workloads(&state), "pending_workloads:1");
        assert!(!state.controller().has_endpoints(&reviews_host()));

        state
            .upsert_workload(WorkloadIdentity {
                name: "reviews-v1-0".to_string(),
                namespace: "default".to_string(),
                addresses: vec!["10.0.0.5".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending_workloads(&state), "pending_workloads:0");
        assert!(state.controller().has_endpoints(&reviews_host()));
    }

    #[test]
    fn test_remove_service_and_workload() {
        let state = state(&[]);
        state.upsert_service(service("reviews", "default")).unwrap();
        let owned = json!({"kubernetes.io/service-name": "reviews"});
        state
            .apply_partition("default", "reviews-a", slice(owned, "10.0.0.1"))
            .unwrap();

        state.remove_service(&reviews_host()).unwrap();
        assert!(!state.controller().has_endpoints(&reviews_host()));
        let err = state.remove_service(&reviews_host()).unwrap_err();
        assert_eq!(err.status_code(), 404);

        // Registering it again rebuilds from the partitions still stored.
        let endpoints = state.upsert_service(service("reviews", "default")).unwrap();
        assert_eq!(endpoints.len(), 1);

        state
            .upsert_workload(WorkloadIdentity {
                name: "reviews-v1-0".to_string(),
                namespace: "default".to_string(),
                addresses: vec!["10.0.0.1".to_string()],
                ..Default::default()
            })
            .unwrap();
        state.remove_workload("default", "reviews-v1-0").unwrap();
        let err = state
            .remove_workload("default", "reviews-v1-0")
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_cluster_local_suffixes_applied() {
        let suffixes = ("CLUSTER_LOCAL_SUFFIXES", ".kube-system.svc.cluster.local");
        let state = state(&[suffixes]);
        let dns = service("kube-dns", "kube-system");
        state.upsert_service(dns).unwrap();
        let owned = json!({"kubernetes.io/service-name": "kube-dns"});
        state
            .apply_partition("kube-system", "kube-dns-a", slice(owned, "10.0.0.10"))
            .unwrap();

        let host = Hostname::from("kube-dns.kube-system.svc.cluster.local");
        let endpoints = state.controller().get_endpoints(&host);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(
            endpoints[0].discoverability,
            DiscoverabilityPolicy::ClusterLocal
        );
    }

    #[test]
    fn test_pin_to_path() {
        let mut missing = None;
        pin_to_path("name", &mut missing, "reviews-abc12").unwrap();
        assert_eq!(missing.as_deref(), Some("reviews-abc12"));

        let mut matching = Some("reviews-abc12".to_string());
        assert!(pin_to_path("name", &mut matching, "reviews-abc12").is_ok());

        let mut conflicting = Some("ratings-xyz".to_string());
        let err = pin_to_path("name", &mut conflicting, "reviews-abc12").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
