//! API errors with HTTP status codes and a uniform error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use skillrun_engine::CatalogError;
use skillrun_store::StoreError;

/// Error details.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    pub message: String,

    #[serde(rename = "type")]
    pub error_type: String,

    pub code: String,

    /// Parameter name for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// Error response wrapper.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

/// API errors.
#[derive(Debug)]
pub enum ApiError {
    // Client errors (4xx)
    /// Invalid JSON in request body.
    InvalidJson { message: String },
    /// Missing required field.
    MissingField { field: &'static str },
    /// Task, agent or skill not found.
    NotFound { resource: &'static str, id: String },
    /// The task is not in a state that allows the request.
    Conflict { message: String },

    // Server errors (5xx)
    /// Content backend unavailable or misbehaving.
    Backend { message: String },
    /// Internal server error.
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message, param) = match self {
            ApiError::InvalidJson { message } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_json",
                message,
                None,
            ),
            ApiError::MissingField { field } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "missing_field",
                format!("Missing required field: {}", field),
                Some(field.to_string()),
            ),
            ApiError::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                format!("{} '{}' not found", resource, id),
                None,
            ),
            ApiError::Conflict { message } => (
                StatusCode::CONFLICT,
                "conflict_error",
                "invalid_state",
                message,
                None,
            ),
            ApiError::Backend { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "backend_error",
                message,
                None,
            ),
            ApiError::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal_error",
                message,
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorObject {
                message,
                error_type: error_type.to_string(),
                code: code.to_string(),
                param,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound {
                resource: "Task",
                id: id.to_string(),
            },
            StoreError::InvalidId(id) => ApiError::NotFound { resource: "Task", id },
            StoreError::InvalidTransition { id, from, .. } => ApiError::Conflict {
                message: format!("Task '{}' is {}", id, from),
            },
            other => {
                error!(error = %other, "Task store error");
                ApiError::Internal {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::AgentNotFound(id) => ApiError::NotFound { resource: "Agent", id },
            CatalogError::SkillNotFound(id) => ApiError::NotFound { resource: "Skill", id },
            other => {
                error!(error = %other, "Content backend error");
                ApiError::Backend {
                    message: other.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillrun_core::TaskId;

    #[tokio::test]
    async fn error_body_shape() {
        let response = ApiError::MissingField { field: "agentId" }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["code"], "missing_field");
        assert_eq!(value["error"]["type"], "invalid_request_error");
        assert_eq!(value["error"]["param"], "agentId");
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let not_found: ApiError = StoreError::NotFound(TaskId::new("t1")).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let backend: ApiError = CatalogError::Backend("down".into()).into();
        assert_eq!(backend.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
