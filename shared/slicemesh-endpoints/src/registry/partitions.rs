//! Partition store keyed by namespace and partition name

use dashmap::DashMap;
use slicemesh_core::NamespacedName;
use std::sync::Arc;

use crate::source::{PartitionSelector, PartitionSource};
use crate::types::{Partition, SourceError};

#[derive(Default)]
pub struct PartitionStore {
    partitions: DashMap<NamespacedName, Arc<Partition>>,
}

impl PartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the partition, returning the version it replaced.
    pub fn apply(&self, partition: Partition) -> Option<Arc<Partition>> {
        self.partitions.insert(partition.key(), Arc::new(partition))
    }

    pub fn remove(&self, key: &NamespacedName) -> Option<Arc<Partition>> {
        self.partitions.remove(key).map(|(_, partition)| partition)
    }

    pub fn get(&self, key: &NamespacedName) -> Option<Arc<Partition>> {
        self.partitions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl PartitionSource for PartitionStore {
    fn list(
        &self,
        namespace: &str,
        selector: &PartitionSelector,
    ) -> Result<Vec<Arc<Partition>>, SourceError> {
        let mut out: Vec<Arc<Partition>> = self
            .partitions
            .iter()
            .filter(|entry| entry.key().namespace == namespace && selector.matches(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
