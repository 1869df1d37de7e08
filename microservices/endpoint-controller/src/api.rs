//! HTTP routes over the endpoint controller

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use slicemesh_core::{HealthStatus, Hostname, SliceMeshError};
use slicemesh_endpoints::{
    AffectedServices, CanonicalEndpoint, PartitionPayload, Proxy, Service, ServiceInstance,
    WorkloadIdentity,
};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::service::ControllerState;

type AppState = Arc<ControllerState>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            "/namespaces/{namespace}/slices/{name}",
            put(apply_slice).delete(remove_slice),
        )
        .route("/services", put(upsert_service))
        .route("/services/{hostname}", delete(remove_service))
        .route("/workloads", put(upsert_workload))
        .route("/workloads/{namespace}/{name}", delete(remove_workload))
        .route("/endpoints", get(list_hostnames))
        .route("/endpoints/{hostname}", get(get_endpoints))
        .route("/services/{hostname}/instances/{port}", get(instances_by_port))
        .route("/proxies/instances", post(instances_for_proxy))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct EndpointsResponse {
    hostname: Hostname,
    endpoints: Vec<Arc<CanonicalEndpoint>>,
}

#[derive(Debug, Serialize)]
struct AffectedResponse {
    services: Vec<EndpointsResponse>,
}

impl From<AffectedServices> for AffectedResponse {
    fn from(affected: AffectedServices) -> Self {
        let mut services: Vec<_> = affected
            .into_iter()
            .map(|(hostname, endpoints)| EndpointsResponse {
                hostname,
                endpoints,
            })
            .collect();
        services.sort_by(|a, b| a.hostname.as_str().cmp(b.hostname.as_str()));
        Self { services }
    }
}

#[derive(Debug, Serialize)]
struct HostnamesResponse {
    hostnames: Vec<Hostname>,
}

#[derive(Debug, Serialize)]
struct InstancesResponse {
    instances: Vec<ServiceInstance>,
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        healthy: true,
        service_id: "endpoint-controller".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

async fn apply_slice(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(payload): Json<PartitionPayload>,
) -> ApiResult<Json<AffectedResponse>> {
    let affected = state.apply_partition(&namespace, &name, payload)?;
    Ok(Json(affected.into()))
}

async fn remove_slice(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<AffectedResponse>> {
    let affected = state.remove_partition(&namespace, &name)?;
    Ok(Json(affected.into()))
}

async fn upsert_service(
    State(state): State<AppState>,
    Json(service): Json<Service>,
) -> ApiResult<Json<EndpointsResponse>> {
    let hostname = service.hostname.clone();
    let endpoints = state.upsert_service(service)?;
    Ok(Json(EndpointsResponse {
        hostname,
        endpoints,
    }))
}

async fn remove_service(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> ApiResult<StatusCode> {
    state.remove_service(&Hostname::new(hostname))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upsert_workload(
    State(state): State<AppState>,
    Json(identity): Json<WorkloadIdentity>,
) -> ApiResult<Json<AffectedResponse>> {
    let affected = state.upsert_workload(identity)?;
    Ok(Json(affected.into()))
}

async fn remove_workload(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.remove_workload(&namespace, &name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_hostnames(State(state): State<AppState>) -> Json<HostnamesResponse> {
    Json(HostnamesResponse {
        hostnames: state.controller().hostnames(),
    })
}

async fn get_endpoints(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> ApiResult<Json<EndpointsResponse>> {
    let hostname = Hostname::new(hostname);
    if !state.controller().has_endpoints(&hostname) {
        let missing = SliceMeshError::NotFound(format!("endpoints for {}", hostname));
        return Err(missing.into());
    }
    let endpoints = state.controller().get_endpoints(&hostname);
    Ok(Json(EndpointsResponse {
        hostname,
        endpoints,
    }))
}

async fn instances_by_port(
    State(state): State<AppState>,
    Path((hostname, port)): Path<(String, u16)>,
) -> Json<InstancesResponse> {
    let instances = state
        .controller()
        .service_instances_by_port(&Hostname::new(hostname), port);
    Json(InstancesResponse { instances })
}

async fn instances_for_proxy(
    State(state): State<AppState>,
    Json(proxy): Json<Proxy>,
) -> Json<InstancesResponse> {
    let instances = state.controller().service_instances_for_proxy(&proxy);
    Json(InstancesResponse { instances })
}
