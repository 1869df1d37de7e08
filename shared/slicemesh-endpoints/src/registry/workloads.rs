//! Workload identities indexed by key and address
//!
//! Addresses whose partition entry names a pod that has not been observed yet are
//! remembered, so the partition can be re-delivered once the pod shows up.

use dashmap::DashMap;
use slicemesh_core::{Hostname, NamespacedName};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::source::{IdentityResolver, Resolution};
use crate::types::{Proxy, TargetRef, WorkloadIdentity};

/// A partition that skipped an address while waiting for its workload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingResync {
    pub partition: NamespacedName,
    pub address: String,
    pub hostname: Hostname,
}

#[derive(Default)]
pub struct WorkloadRegistry {
    by_key: DashMap<NamespacedName, Arc<WorkloadIdentity>>,
    by_address: DashMap<String, Vec<Arc<WorkloadIdentity>>>,
    pending: DashMap<NamespacedName, HashSet<PendingResync>>,
}

impl WorkloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the workload and hand back the partitions that were waiting for it.
    pub fn upsert(&self, identity: WorkloadIdentity) -> Vec<PendingResync> {
        let key = NamespacedName::new(identity.namespace.clone(), identity.name.clone());
        let identity = Arc::new(identity);

        if let Some(previous) = self.by_key.insert(key.clone(), Arc::clone(&identity)) {
            self.unindex(&key, &previous);
        }
        for address in &identity.addresses {
            self.by_address
                .entry(address.clone())
                .or_default()
                .push(Arc::clone(&identity));
        }

        let mut resync: Vec<PendingResync> = self
            .pending
            .remove(&key)
            .map(|(_, waiting)| waiting.into_iter().collect())
            .unwrap_or_default();
        resync.sort_by(|a, b| (&a.partition, &a.address).cmp(&(&b.partition, &b.address)));
        resync
    }

    pub fn remove(&self, key: &NamespacedName) -> Option<Arc<WorkloadIdentity>> {
        let (_, identity) = self.by_key.remove(key)?;
        self.unindex(key, &identity);
        Some(identity)
    }

    pub fn get(&self, key: &NamespacedName) -> Option<Arc<WorkloadIdentity>> {
        self.by_key.get(key).map(|w| Arc::clone(w.value()))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }

    fn unindex(&self, key: &NamespacedName, identity: &WorkloadIdentity) {
        for address in &identity.addresses {
            if let Some(mut workloads) = self.by_address.get_mut(address) {
                workloads.retain(|w| w.namespace != key.namespace || w.name != key.name);
            }
            self.by_address
                .remove_if(address, |_, workloads| workloads.is_empty());
        }
    }

    /// First workload at `address` living in `namespace`. Host-network addresses may
    /// be shared, so this is a best guess.
    fn find_by_address(&self, address: &str, namespace: &str) -> Option<Arc<WorkloadIdentity>> {
        self.by_address
            .get(address)
            .and_then(|workloads| workloads.iter().find(|w| w.namespace == namespace).cloned())
    }
}

impl IdentityResolver for WorkloadRegistry {
    fn resolve(
        &self,
        address: &str,
        partition: &NamespacedName,
        target_ref: Option<&TargetRef>,
        hostname: &Hostname,
    ) -> Resolution {
        match target_ref.filter(|t| t.is_pod()) {
            Some(target) => {
                let key = NamespacedName::new(target.namespace.clone(), target.name.clone());
                match self.get(&key) {
                    Some(identity) => Resolution::found(identity),
                    None => {
                        debug!(
                            pod = %key,
                            address = %address,
                            "Pod not yet known, queueing resync"
                        );
                        self.pending.entry(key).or_default().insert(PendingResync {
                            partition: partition.clone(),
                            address: address.to_string(),
                            hostname: hostname.clone(),
                        });
                        Resolution::missing()
                    }
                }
            }
            // Manually managed endpoint: look the address up to pick up metadata.
            None => Resolution {
                identity: self.find_by_address(address, &partition.namespace),
                expected: false,
            },
        }
    }

    fn identity_for_proxy(&self, proxy: &Proxy) -> Option<Arc<WorkloadIdentity>> {
        // Sidecar ids take the form `<pod>.<namespace>`.
        if let Some((name, namespace)) = proxy.id.rsplit_once('.') {
            if let Some(identity) = self.get(&NamespacedName::new(namespace, name)) {
                return Some(identity);
            }
        }
        proxy
            .ip_addresses
            .iter()
            .find_map(|ip| self.find_by_address(ip, &proxy.namespace))
    }

    fn endpoint_deleted(&self, partition: &NamespacedName, address: &str) {
        for mut waiting in self.pending.iter_mut() {
            waiting
                .value_mut()
                .retain(|p| &p.partition != partition || p.address != address);
        }
        self.pending.retain(|_, waiting| !waiting.is_empty());
    }
}
