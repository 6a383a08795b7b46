//! Library Error Types
//!
//! One taxonomy for every server-side service. Handlers return
//! `Result<_, LibraryError>` and the `IntoResponse` impl renders the
//! unified envelope with a stable error code.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::gateway::types::{ApiResponse, error_codes};
use crate::storage::BlobError;

/// Message returned for every 5xx so internal detail never reaches the caller.
pub const GENERIC_SERVER_ERROR: &str = "Internal server error, please try again later";

/// Service error taxonomy
#[derive(Error, Debug, Clone)]
pub enum LibraryError {
    // === Lookup ===
    #[error("{0}")]
    NotFound(String),

    // === Caller errors ===
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, please slow down")]
    RateLimited,

    // === Credentials / permissions ===
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    // === Collaborators ===
    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LibraryError {
    pub fn not_found(what: &str) -> Self {
        LibraryError::NotFound(format!("{} not found", what))
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LibraryError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LibraryError::NotFound(_) => "NOT_FOUND",
            LibraryError::BadRequest(_) => "BAD_REQUEST",
            LibraryError::Validation { .. } => "VALIDATION_FAILED",
            LibraryError::Conflict(_) => "CONFLICT",
            LibraryError::RateLimited => "RATE_LIMITED",
            LibraryError::Unauthorized(_) => "UNAUTHORIZED",
            LibraryError::Forbidden(_) => "FORBIDDEN",
            LibraryError::Upstream(_) => "UPSTREAM_ERROR",
            LibraryError::Database(_) => "DATABASE_ERROR",
            LibraryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Numeric code carried in the `code` field of the envelope
    pub fn numeric_code(&self) -> i32 {
        match self {
            LibraryError::BadRequest(_) => error_codes::INVALID_PARAMETER,
            LibraryError::Validation { .. } => error_codes::VALIDATION_FAILED,
            LibraryError::Conflict(_) => error_codes::CONFLICT,
            LibraryError::Unauthorized(_) => error_codes::UNAUTHORIZED,
            LibraryError::Forbidden(_) => error_codes::FORBIDDEN,
            LibraryError::NotFound(_) => error_codes::NOT_FOUND,
            LibraryError::RateLimited => error_codes::RATE_LIMITED,
            LibraryError::Internal(_) | LibraryError::Database(_) => error_codes::INTERNAL_ERROR,
            LibraryError::Upstream(_) => error_codes::UPSTREAM_ERROR,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
            LibraryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            LibraryError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LibraryError::Conflict(_) => StatusCode::CONFLICT,
            LibraryError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            LibraryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LibraryError::Forbidden(_) => StatusCode::FORBIDDEN,
            LibraryError::Upstream(_) => StatusCode::BAD_GATEWAY,
            LibraryError::Database(_) | LibraryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> String {
        if self.http_status().is_server_error() {
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<sqlx::Error> for LibraryError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return LibraryError::Conflict("Record already exists".to_string());
                }
                Some("23503") => {
                    return LibraryError::BadRequest(
                        "Referenced record is missing or still in use".to_string(),
                    );
                }
                _ => {}
            }
        }
        LibraryError::Database(e.to_string())
    }
}

impl From<BlobError> for LibraryError {
    fn from(e: BlobError) -> Self {
        LibraryError::Upstream(e.to_string())
    }
}

/// Surfaces the first field-level message (fields visited in name order)
impl From<validator::ValidationErrors> for LibraryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        for (field, errs) in fields {
            if let Some(first) = errs.first() {
                let message = first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field));
                return LibraryError::validation(field.to_string(), message);
            }
        }
        LibraryError::BadRequest("Invalid input".to_string())
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(e: serde_json::Error) -> Self {
        LibraryError::Internal(e.to_string())
    }
}

impl IntoResponse for LibraryError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }

        let mut body = ApiResponse::<()>::error(self.numeric_code(), self.public_message());
        if let LibraryError::Validation { field, message } = &self {
            let mut errors = BTreeMap::new();
            errors.insert(field.clone(), vec![message.clone()]);
            body.errors = Some(errors);
        }
        (status, Json(body)).into_response()
    }
}

pub type LibraryResult<T> = Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LibraryError::not_found("Resource").code(), "NOT_FOUND");
        assert_eq!(LibraryError::RateLimited.code(), "RATE_LIMITED");
        assert_eq!(
            LibraryError::validation("title", "Title is required").code(),
            "VALIDATION_FAILED"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            LibraryError::Forbidden("no".into()).http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            LibraryError::BadRequest("no file".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LibraryError::validation("f", "m").http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LibraryError::Upstream("cdn".into()).http_status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_validation_errors_keep_first_message() {
        #[derive(validator::Validate)]
        struct Form {
            #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
            title: String,
        }

        let err: LibraryError = validator::Validate::validate(&Form { title: "ab".into() })
            .unwrap_err()
            .into();
        match err {
            LibraryError::Validation { field, message } => {
                assert_eq!(field, "title");
                assert_eq!(message, "Title must be at least 3 characters");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let err = LibraryError::Database("relation resources_tb does not exist".into());
        assert_eq!(err.public_message(), GENERIC_SERVER_ERROR);

        let err = LibraryError::not_found("Resource");
        assert_eq!(err.public_message(), "Resource not found");
    }
}
