//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Unknown endpoint
    #[error("Not found: {0}")]
    NotFound(String),

    /// Query building or execution error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Status and machine-readable code
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Query(e) => match e {
                QueryError::UnknownColumn { .. } => (StatusCode::BAD_REQUEST, "UNKNOWN_COLUMN"),
                QueryError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT"),
                QueryError::AggregationWithoutGroupBy => {
                    (StatusCode::BAD_REQUEST, "AGGREGATION_WITHOUT_GROUPBY")
                }
                e if e.is_client_error() => (StatusCode::BAD_REQUEST, "QUERY_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_ERROR"),
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unknown = ApiError::Query(QueryError::UnknownColumn {
            table: "flags".into(),
            column: "colour".into(),
        });
        assert_eq!(unknown.status().0, StatusCode::BAD_REQUEST);

        let agg = ApiError::Query(QueryError::UnknownAggregateOperator("median".into()));
        assert_eq!(agg.status(), (StatusCode::BAD_REQUEST, "QUERY_ERROR"));

        let backend = ApiError::Query(QueryError::Backend("disk I/O error".into()));
        assert_eq!(backend.status().0, StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::NotFound("x".into()).status().0, StatusCode::NOT_FOUND);
    }
}
