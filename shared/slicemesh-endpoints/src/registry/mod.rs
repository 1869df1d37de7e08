//! In-memory collaborators
//!
//! Reference implementations of the source traits, used by the endpoint-controller
//! service and by tests.

mod metrics;
mod partitions;
mod services;
mod workloads;

pub use metrics::CounterMetricsSink;
pub use partitions::PartitionStore;
pub use services::ServiceRegistry;
pub use workloads::{PendingResync, WorkloadRegistry};
