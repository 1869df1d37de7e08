//! Endpoint Controller - Endpoint slice aggregation over HTTP
//!
//! Accepts partition, service and workload updates and serves the merged,
//! health-classified endpoint view of every service.

use anyhow::Context;
use slicemesh_core::{MicroserviceRuntime, ServiceConfig};
use std::sync::Arc;
use tracing::info;

mod api;
mod error;
mod service;

pub use service::EndpointControllerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("loading configuration")?;
    slicemesh_telemetry::init(&config.service_name).context("initializing telemetry")?;

    info!(
        send_unhealthy_endpoints = config.features.send_unhealthy_endpoints,
        persistent_session_label = %config.features.persistent_session_label,
        "Starting Endpoint Controller"
    );

    let runtime = MicroserviceRuntime::new(config.clone());
    let service = Arc::new(EndpointControllerService::new(config));
    runtime
        .run(service)
        .await
        .context("endpoint controller exited with an error")?;
    Ok(())
}
