use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use fabric::docker::DockerError;
use fabric::query::QueryError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error("An internal error occurred")]
    #[allow(dead_code)]
    Internal(#[source] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) | ApiError::NotConfigured(_) | ApiError::Query(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Docker(DockerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Docker(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(source) => {
                // Log the detail server-side but don't expose it.
                tracing::error!(error = ?source, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_keep_their_exact_message() {
        assert_eq!(
            ApiError::Query(QueryError::NoHosts).to_string(),
            "no enabled hosts configured"
        );
        assert_eq!(
            ApiError::Query(QueryError::NoMetrics).to_string(),
            "no metrics selected"
        );
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let err = ApiError::Internal(anyhow::anyhow!("secret connection string"));
        assert_eq!(err.to_string(), "An internal error occurred");
    }
}
