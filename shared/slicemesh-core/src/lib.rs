//! SliceMesh Core - Shared identifiers and service infrastructure
//!
//! This crate provides:
//! - Standard service trait the control-plane microservices implement
//! - Common identifier types (Hostname, NamespacedName, PartitionId)
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::{FeatureFlags, ServiceConfig};
pub use domain::*;
pub use error::{Result, SliceMeshError};
pub use service::{
    DependencyStatus, HealthStatus, MicroserviceRuntime, ReadinessStatus, SliceMeshService,
};
