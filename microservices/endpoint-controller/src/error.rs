//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use slicemesh_core::SliceMeshError;
use slicemesh_endpoints::PayloadError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub SliceMeshError);

impl From<SliceMeshError> for ApiError {
    fn from(err: SliceMeshError) -> Self {
        Self(err)
    }
}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        Self(SliceMeshError::Validation(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "code": self.0.error_code(),
        }));

        (status, body).into_response()
    }
}
