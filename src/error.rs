//! # Error Handling
//!
//! This module defines custom error types and how they're converted to HTTP responses.
//!
//! ## Error Taxonomy (relay-specific):
//! - **Auth errors**: missing/invalid credential (401) or an identity that
//!   doesn't match the request body (403). No upstream call is made for these.
//! - **UpstreamUnavailable**: the external AI service failed or returned a
//!   non-2xx response. Depending on the resilience policy this is either
//!   swallowed by a fallback payload (and never reaches this type's HTTP
//!   mapping) or surfaced as 502.
//! - **ServiceUnavailable**: the realtime backend failed its health probe, so
//!   no audio session descriptor can be handed out (503).
//! - Everything else follows the usual 400/404/500 split.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::Unauthorized("Invalid authentication token".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (500)
    Internal(String),

    /// Client sent invalid or malformed data (400)
    BadRequest(String),

    /// Requested resource was not found (404)
    NotFound(String),

    /// Configuration file or environment variable problems (500)
    ConfigError(String),

    /// User input failed validation rules (400)
    ValidationError(String),

    /// Missing or invalid bearer credential (401)
    Unauthorized(String),

    /// Verified identity does not match the requested user_id (403)
    Forbidden(String),

    /// Upstream AI service unreachable or returned an error (502)
    UpstreamUnavailable(String),

    /// Upstream realtime backend failed its health check (503)
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts our custom errors into HTTP responses with a consistent JSON body:
///
/// ```json
/// {
///   "error": {
///     "type": "unauthorized",
///     "message": "Invalid authentication token",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AppError::Unauthorized(msg) => (
                actix_web::http::StatusCode::UNAUTHORIZED,
                "unauthorized",
                msg.clone(),
            ),
            AppError::Forbidden(msg) => (
                actix_web::http::StatusCode::FORBIDDEN,
                "forbidden",
                msg.clone(),
            ),
            AppError::UpstreamUnavailable(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "upstream_unavailable",
                msg.clone(),
            ),
            AppError::ServiceUnavailable(msg) => (
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, so they map to
/// 400 rather than 500.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Network failures talking to the external AI service. Handlers decide
/// whether to substitute the fallback payload or propagate this as 502.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (AppError::Unauthorized("x".into()), 401),
            (AppError::Forbidden("x".into()), 403),
            (AppError::BadRequest("x".into()), 400),
            (AppError::NotFound("x".into()), 404),
            (AppError::UpstreamUnavailable("x".into()), 502),
            (AppError::ServiceUnavailable("x".into()), 503),
            (AppError::Internal("x".into()), 500),
        ];

        for (err, expected) in cases {
            assert_eq!(err.error_response().status().as_u16(), expected);
        }
    }

    #[test]
    fn test_display_includes_message() {
        let err = AppError::Forbidden("user mismatch".to_string());
        assert!(err.to_string().contains("user mismatch"));
    }
}
