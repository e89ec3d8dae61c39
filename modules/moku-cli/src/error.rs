//! Maps component error kinds onto HTTP status codes: validation/not-found
//! surface to the caller, everything else is a 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use moku_orchestrator::OrchestratorError;
use moku_registry::RegistryError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(msg) => Self(StatusCode::BAD_REQUEST, msg),
            RegistryError::NotFound(msg) => Self(StatusCode::NOT_FOUND, msg),
            RegistryError::Conflict(msg) => Self(StatusCode::CONFLICT, msg),
            other => {
                error!(error = %other, "registry error");
                Self(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(msg) => Self(StatusCode::BAD_REQUEST, msg),
            OrchestratorError::NotFound(msg) => Self(StatusCode::NOT_FOUND, msg),
            OrchestratorError::Closed => Self(StatusCode::SERVICE_UNAVAILABLE, "orchestrator is closed".to_string()),
            OrchestratorError::Registry(RegistryError::NotFound(msg)) => Self(StatusCode::NOT_FOUND, msg),
            OrchestratorError::Registry(RegistryError::Conflict(msg)) => Self(StatusCode::CONFLICT, msg),
            other => {
                error!(error = %other, "orchestrator error");
                Self(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}
