//! Lifecycle shared by the control-plane binaries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, SliceMeshError};

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service_id: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub dependencies: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub latency_ms: Option<u64>,
}

#[async_trait]
pub trait SliceMeshService: Send + Sync + 'static {
    fn service_id(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    async fn health(&self) -> HealthStatus;

    async fn ready(&self) -> ReadinessStatus;

    async fn shutdown(&self) -> Result<()>;

    /// Serve until the listener stops. Returning ends the process.
    async fn start(&self) -> Result<()>;
}

/// Drives one service from start until a signal arrives or the service exits
pub struct MicroserviceRuntime {
    config: ServiceConfig,
    started: Instant,
}

impl MicroserviceRuntime {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
        }
    }

    /// Run the service. A failure in `start` (a port already taken, say) is returned
    /// instead of leaving the process waiting for a signal.
    pub async fn run<S: SliceMeshService>(&self, service: Arc<S>) -> Result<()> {
        info!(
            service = %self.config.service_name,
            service_id = service.service_id(),
            version = service.version(),
            cluster_id = %self.config.cluster_id,
            "Starting microservice"
        );

        let serving = Arc::clone(&service);
        let mut server = tokio::spawn(async move { serving.start().await });

        let outcome = tokio::select! {
            joined = &mut server => match joined {
                Ok(result) => result,
                Err(e) => {
                    let message = format!("service task failed: {}", e);
                    Err(SliceMeshError::Internal(message))
                }
            },
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        if let Err(e) = service.shutdown().await {
            warn!("Error during shutdown: {}", e);
        }
        server.abort();

        info!(
            uptime_seconds = self.started.elapsed().as_secs(),
            "Microservice stopped"
        );
        outcome
    }
}

/// Resolves on Ctrl+C or SIGTERM. A listener that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
