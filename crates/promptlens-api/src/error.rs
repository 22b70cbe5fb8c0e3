// API error responses
//
// Every failure leaving this service is `{ "error": ..., "code": ... }`
// with a status matching the code's class. Internal details are logged at
// the handler, never echoed to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptlens_core::{ApiErrorCode, Error};
use serde::Serialize;
use utoipa::ToSchema;

/// Wire shape of an error response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description of what went wrong
    pub error: String,
    /// Stable machine-readable code
    pub code: ApiErrorCode,
}

/// An error ready to be returned from a handler
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ApiErrorCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                code,
            },
        }
    }

    /// Store failure; details stay in the logs
    pub fn database() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::DatabaseError,
            "database error",
        )
    }

    /// Unexpected failure; details stay in the logs
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::InternalError,
            "internal error",
        )
    }

    /// Per-IP connection cap reached
    pub fn too_many_connections() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            ApiErrorCode::ValidationError,
            "too many concurrent connections from this address",
        )
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::InvalidLimit(_) | Error::InvalidCursor(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Validation-class messages are safe to echo; internal ones are not
        let message = match &err {
            Error::Config(_) | Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self::new(status, err.code(), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
