//! API Error Types
//!
//! Each handler has its own error type so that the external message stays
//! stable while the internal detail goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use data_validator::ValidationError;
use serde_json::json;
use storage::StorageError;
use thiserror::Error;

/// Plain-text body returned after a successful ingest
pub const INGEST_OK: &str = "✅ Datos guardados correctamente";

/// Message returned when no storage connection could be obtained
pub const CONNECTION_MESSAGE: &str = "Error de conexión";

/// Message returned for any other read-path failure
pub const INTERNAL_MESSAGE: &str = "Error interno";

/// Failures on the ingest path
#[derive(Debug, Error)]
pub enum IngestError {
    /// The body could not be read as a form
    #[error("Malformed request body: {0}")]
    Rejected(String),

    /// A field failed coercion
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Storage unreachable, nothing was attempted
    #[error("Storage connection failed: {0}")]
    Connection(String),

    /// The insert itself failed
    #[error("Insert failed: {0}")]
    Statement(String),
}

impl IngestError {
    /// Label used for the outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            IngestError::Rejected(_) | IngestError::Invalid(_) => "rejected",
            IngestError::Connection(_) => "connection_error",
            IngestError::Statement(_) => "statement_error",
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Connection(detail) => IngestError::Connection(detail),
            StorageError::Statement(detail) | StorageError::Config(detail) => {
                IngestError::Statement(detail)
            }
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::Rejected(detail) => {
                (StatusCode::BAD_REQUEST, format!("❌ Error: {}", detail)).into_response()
            }
            IngestError::Invalid(err) => {
                (StatusCode::BAD_REQUEST, format!("❌ Error: {}", err)).into_response()
            }
            IngestError::Connection(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("❌ {}", CONNECTION_MESSAGE),
            )
                .into_response(),
            IngestError::Statement(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("❌ Error: {}", detail),
            )
                .into_response(),
        }
    }
}

/// Failures on the query path; detail never leaves the process
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Storage connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Internal(String),
}

impl QueryError {
    /// Label used for the outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            QueryError::Connection(_) => "connection_error",
            QueryError::Internal(_) => "statement_error",
        }
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Connection(detail) => QueryError::Connection(detail),
            other => QueryError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            QueryError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, CONNECTION_MESSAGE),
            QueryError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Startup failures
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid rate limit settings: {0}")]
    RateLimit(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_connection_hides_detail() {
        let response =
            IngestError::Connection("unable to open database file".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "❌ Error de conexión");
    }

    #[tokio::test]
    async fn test_ingest_statement_keeps_detail() {
        let response = IngestError::Statement("no such table: datos".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "❌ Error: no such table: datos");
    }

    #[tokio::test]
    async fn test_query_errors_are_generic() {
        let response = QueryError::Internal("no such table: datos".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, r#"{"error":"Error interno"}"#);

        let response = QueryError::Connection("unable to open".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, r#"{"error":"Error de conexión"}"#);
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: IngestError = StorageError::Connection("x".into()).into();
        assert_eq!(err.outcome(), "connection_error");

        let err: QueryError = StorageError::Statement("x".into()).into();
        assert_eq!(err.outcome(), "statement_error");
    }
}
