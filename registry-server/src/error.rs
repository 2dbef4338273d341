//! # Error Handling and Response Types
//!
//! HTTP-facing errors for the registry server.
//!
//! - [`AppError`]: every error a handler can return
//! - [`ErrorCode`]: machine-readable classification and HTTP status
//! - [`ApiErrorResponse`]: the JSON body sent to npm clients
//!
//! npm clients read `error` and `reason`, both prefixed with the code, and
//! nothing else is sent:
//!
//! ```json
//! {
//!   "error": "[not_found] document not found",
//!   "reason": "[not_found] document not found"
//! }
//! ```
//!
//! Every not-found response carries the same message, whatever the cause.
//! The underlying reason and the error code are logged, never sent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::revision_store::StoreError;
use crate::unpublish::UnpublishError;

/// Message used for every 404.
pub const NOT_FOUND_MESSAGE: &str = "document not found";

/// npm-compatible error body
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub reason: String,
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    AuthError,
    Forbidden,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::AuthError => "unauthorized",
            ErrorCode::Forbidden => "no_perm",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::AuthError => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Unpublish(#[from] UnpublishError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Json(_) => ErrorCode::ValidationError,
            AppError::Store(e) if e.is_not_found() => ErrorCode::NotFound,
            AppError::Store(e) if e.is_conflict() => ErrorCode::Conflict,
            AppError::Unpublish(e) => match e {
                UnpublishError::NotFound(_) => ErrorCode::NotFound,
                UnpublishError::Conflict { .. } => ErrorCode::Conflict,
                UnpublishError::Unauthenticated => ErrorCode::AuthError,
                UnpublishError::Forbidden => ErrorCode::Forbidden,
                UnpublishError::Store(_) => ErrorCode::InternalError,
            },
            AppError::Store(_) | AppError::Io(_) | AppError::InternalError(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Message sent to the client, prefixed with the error code.
    pub fn public_message(&self) -> String {
        let code = self.error_code();
        match code {
            ErrorCode::NotFound => format!("[{}] {}", code.as_str(), NOT_FOUND_MESSAGE),
            ErrorCode::AuthError => format!("[{}] Login first", code.as_str()),
            _ => format!("[{}] {}", code.as_str(), self),
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let message = self.public_message();
        ApiErrorResponse {
            error: message.clone(),
            reason: message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, code = code.as_str(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = code.as_str(), status = %status, "Request rejected");
        }

        let error_response = self.to_error_response();
        (status, axum::Json(error_response)).into_response()
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Revision;
    use crate::unpublish::NotFoundReason;

    #[test]
    fn test_unpublish_errors_map_to_statuses() {
        let cases = [
            (
                UnpublishError::NotFound(NotFoundReason::MalformedRevision),
                StatusCode::NOT_FOUND,
            ),
            (
                UnpublishError::Conflict {
                    current: Revision::initial(),
                },
                StatusCode::CONFLICT,
            ),
            (UnpublishError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (UnpublishError::Forbidden, StatusCode::FORBIDDEN),
            (
                UnpublishError::Store(StoreError::Backend("disk gone".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(AppError::from(error).error_code().http_status(), status);
        }
    }

    #[test]
    fn test_not_found_body_is_uniform() {
        for reason in [
            NotFoundReason::MalformedVersion,
            NotFoundReason::MissingPackage,
            NotFoundReason::MissingVersion,
        ] {
            let body = AppError::from(UnpublishError::NotFound(reason)).to_error_response();
            assert_eq!(body.error, "[not_found] document not found");
            assert_eq!(body.reason, body.error);
        }

        let body =
            AppError::from(StoreError::PackageNotFound("secret".to_string())).to_error_response();
        assert_eq!(body.error, "[not_found] document not found");
    }

    #[test]
    fn test_body_has_only_error_and_reason() {
        let body = AppError::from(UnpublishError::Forbidden).to_error_response();
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "error": "[no_perm] admin privileges required",
                "reason": "[no_perm] admin privileges required"
            })
        );
    }

    #[test]
    fn test_store_conflict_is_409() {
        let error = AppError::from(StoreError::Conflict {
            name: "p".to_string(),
            current: Revision::initial(),
        });
        assert_eq!(error.error_code(), ErrorCode::Conflict);
    }
}
