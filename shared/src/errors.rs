//! # Application Error Types
//!
//! Unified error handling with automatic HTTP conversion.
//!
//! ## Error Taxonomy
//!
//! Each variant maps to a specific HTTP status code. The API deliberately
//! uses a small status set; the body is always `{"message": "<human readable>"}`
//! and the status code is the only machine-readable signal.
//!
//! | Kind | HTTP | Example message |
//! |------|------|-----------------|
//! | Validation | 400 | `invalid email format` |
//! | Unauthenticated / unauthorized | 401 | `authentication required` |
//! | Not found | 404 | `user with id 'X' not found` |
//! | Conflict | 409 | `email already exists` |
//! | Rate-limited | 429 | `rate limit exceeded` |
//! | Internal | 500 | `An unexpected error occurred` |
//!
//! 403 is intentionally absent: authorization failures surface as 401.
//! 503 is absent: a down dependency is an internal error to the client.
//!
//! ## Propagation Rules
//!
//! - Validation and authorization errors carry their message to the client.
//! - Database errors are classified: unique-constraint violations become
//!   409 via [`ApiError::from_db_conflict`]; everything else becomes 500 and
//!   the raw driver message is logged, never returned.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::errors::{ApiError, ApiResult};
//!
//! async fn get_user(id: &str) -> ApiResult<User> {
//!     repo.find_by_id(id)
//!         .await?
//!         .ok_or_else(|| ApiError::not_found(format!("user with id '{}' not found", id)))
//! }
//! ```

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication / Authorization (401 Unauthorized)
    // =========================================================================
    // No header, bad scheme, or missing principal. The client should attach
    // (or re-acquire) credentials.

    /// Request carries no usable credential, or the principal lacks the
    /// required role/write permission.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Credential was presented but is invalid: bad signature, expired,
    /// blacklisted, revoked, or simply unknown. Also covers wrong
    /// username/password on login.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Wrong username/password combination on login.
    #[error("invalid credentials")]
    InvalidCredentials,

    // =========================================================================
    // Validation (400 Bad Request)
    // =========================================================================

    /// Request is syntactically fine but semantically invalid: unknown
    /// field, bad ULID, bad operator, limit out of range, type mismatch.
    #[error("{message}")]
    Validation {
        /// Human-readable description of what's wrong
        message: String,
    },

    // =========================================================================
    // Resources (404 Not Found, 409 Conflict)
    // =========================================================================

    /// Requested resource doesn't exist.
    #[error("{message}")]
    NotFound {
        /// e.g. `user with id 'X' not found`
        message: String,
    },

    /// Action would violate a uniqueness constraint.
    #[error("{message}")]
    Conflict {
        /// e.g. `email already exists`
        message: String,
    },

    // =========================================================================
    // Rate Limiting (429 Too Many Requests)
    // =========================================================================

    /// Principal or (ip, username) pair exceeded its request budget.
    /// Carries the `Retry-After` value in seconds.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the client may retry
        retry_after_seconds: u64,
    },

    // =========================================================================
    // Server Errors (500 Internal Server Error)
    // =========================================================================
    // Logged with full detail; clients only ever see the generic message.

    /// Database operation failed for a non-conflict reason.
    #[error("An unexpected error occurred")]
    Database(#[from] sqlx::Error),

    /// Unspecified internal error. The message is for logging only.
    #[error("An unexpected error occurred")]
    Internal {
        /// Internal message for logging (not exposed to client)
        message: String,
    },
}

// =============================================================================
// Constructors & Classification
// =============================================================================

impl ApiError {
    /// Shorthand for a 400 with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Shorthand for a 404 with the given message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Shorthand for a 409 with the given message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Shorthand for a 500 whose detail is only logged.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classifies a database error: unique-constraint violations become a
    /// 409 with `conflict_message`, everything else a 500.
    pub fn from_db_conflict(err: sqlx::Error, conflict_message: impl Into<String>) -> Self {
        if is_unique_violation(&err) {
            Self::Conflict { message: conflict_message.into() }
        } else {
            Self::Database(err)
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired | Self::InvalidToken | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors are logged at ERROR level with full detail; client
    /// errors (4xx) are logged at WARN level.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal { .. })
    }
}

/// Returns `true` when the sqlx error is a unique-constraint violation in
/// any of the supported dialects.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                // SQLite reports constraint failures with a generic kind in
                // some driver versions; fall back to the message text.
                || db_err.message().contains("UNIQUE constraint failed")
                || db_err.message().contains("Duplicate entry")
        }
        _ => false,
    }
}

// =============================================================================
// Response Structure
// =============================================================================

/// Error response body: a single human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub message: String,
}

// =============================================================================
// Validator Integration
// =============================================================================

/// Converts field-level validation errors into a single 400 message.
///
/// The first failing field wins; DTOs attach explicit `message` attributes
/// so the output reads like `invalid email format` rather than a code.
impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => match e.code.as_ref() {
                        "email" => "invalid email format".to_string(),
                        code => format!("invalid {}: {}", field, code),
                    },
                })
            })
            .next()
            .unwrap_or_else(|| "validation failed".to_string());

        Self::Validation { message }
    }
}

// =============================================================================
// Actix-web Integration
// =============================================================================

/// Implements Actix-web's `ResponseError` trait.
///
/// Allows returning `ApiError` directly from handlers; the response body is
/// the `{"message": …}` envelope and rate-limit errors carry `Retry-After`.
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            match self {
                Self::Database(e) => tracing::error!(error = %e, "Database error"),
                Self::Internal { message } => tracing::error!(error = %message, "Internal error"),
                _ => {}
            }
        }

        let body = ErrorResponse { message: self.to_string() };
        let mut builder = HttpResponse::build(self.status_code());

        if let Self::RateLimited { retry_after_seconds } = self {
            builder.insert_header(("Retry-After", retry_after_seconds.to_string()));
        }

        builder.json(body)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_errors_return_401() {
        assert_eq!(ApiError::AuthenticationRequired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(ApiError::validation("bad input").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::not_found("user with id 'x' not found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::conflict("email already exists").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited { retry_after_seconds: 10 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_server_errors_are_flagged_and_generic() {
        let err = ApiError::internal("pool exhausted");
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), "An unexpected error occurred");
        assert!(!ApiError::InvalidToken.is_server_error());
    }

    #[test]
    fn test_validation_message_passthrough() {
        let err = ApiError::validation("invalid email format");
        assert_eq!(err.to_string(), "invalid email format");
    }

    #[test]
    fn test_canonical_messages() {
        assert_eq!(ApiError::AuthenticationRequired.to_string(), "authentication required");
        assert_eq!(ApiError::InvalidToken.to_string(), "invalid or expired token");
        assert_eq!(
            ApiError::RateLimited { retry_after_seconds: 1 }.to_string(),
            "rate limit exceeded"
        );
    }
}
