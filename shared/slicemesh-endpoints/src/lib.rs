//! Endpoint Slice Aggregation
//!
//! Services publish their endpoints as independently updated partitions. This crate
//! folds those partitions into one deduplicated, health-classified endpoint set per
//! service and answers the point queries the proxies need.

pub mod builder;
pub mod cache;
pub mod controller;
pub mod payload;
pub mod processor;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod types;

pub use cache::SliceAggregationCache;
pub use controller::{AffectedServices, EndpointSliceController};
pub use payload::{PartitionPayload, PayloadError};
pub use processor::{EndpointSliceProcessor, EntryHealth};
pub use resolver::ServiceInstanceResolver;
pub use source::{
    IdentityResolver, MetricsSink, PartitionSelector, PartitionSource, Resolution, ServiceDirectory,
};
pub use types::*;
