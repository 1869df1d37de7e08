//! Service registry keyed by hostname

use parking_lot::RwLock;
use slicemesh_core::{Hostname, NamespacedName};
use std::collections::HashMap;
use std::sync::Arc;

use crate::source::ServiceDirectory;
use crate::types::{DiscoverabilityPolicy, Service};

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<Hostname, Arc<Service>>>,
    /// Hostname suffixes whose endpoints stay inside the local cluster.
    cluster_local_suffixes: Vec<String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster_local_suffixes(suffixes: Vec<String>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            cluster_local_suffixes: suffixes,
        }
    }

    pub fn upsert(&self, service: Service) -> Arc<Service> {
        let service = Arc::new(service);
        self.services
            .write()
            .insert(service.hostname.clone(), Arc::clone(&service));
        service
    }

    pub fn remove(&self, hostname: &Hostname) -> Option<Arc<Service>> {
        self.services.write().remove(hostname)
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServiceDirectory for ServiceRegistry {
    fn get_service(&self, hostname: &Hostname) -> Option<Arc<Service>> {
        self.services.read().get(hostname).cloned()
    }

    fn services_for(&self, name: &NamespacedName) -> Vec<Arc<Service>> {
        let mut out: Vec<Arc<Service>> = self
            .services
            .read()
            .values()
            .filter(|svc| svc.name == name.name && svc.namespace == name.namespace)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        out
    }

    fn discoverability_policy(&self, service: &Service) -> DiscoverabilityPolicy {
        let host = service.hostname.as_str();
        if self
            .cluster_local_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()))
        {
            DiscoverabilityPolicy::ClusterLocal
        } else {
            DiscoverabilityPolicy::AlwaysDiscoverable
        }
    }
}
