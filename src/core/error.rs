//! # Error Handling Module
//!
//! Error types for the authorization middleware and event logger, built on
//! `thiserror`. Every variant maps to an HTTP status code so handlers and
//! middleware can return `GatewayError` directly.
//!
//! Denials produced by the authorizer are *not* errors: they are carried as
//! [`AuthDecision`](crate::auth::AuthDecision) values and only turned into a
//! `GatewayError` at the HTTP boundary. The variants here cover configuration
//! problems, transport failures and the response shapes of those denials.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the crate
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the auth gateway
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Authentication failures (missing header, token rejected by the provider)
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Authorization failures (insufficient roles)
    #[error("Authorization failed: {reason}")]
    Authorization { reason: String },

    /// The identity provider rate-limited the lookup
    #[error("Rate limit exceeded: {reason}")]
    RateLimitExceeded { reason: String },

    /// The identity provider answered with something we cannot use
    #[error("Identity provider error: {message}")]
    IdentityProvider { message: String },

    /// Analytics sink rejected or failed to receive an event
    #[error("Analytics sink error: {message}")]
    Analytics { message: String },

    /// Request validation errors (malformed body, missing fields, etc.)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// HTTP client errors when calling the identity provider or analytics sink
    #[error("HTTP client error: {message}")]
    HttpClient { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an authentication error with a custom reason
    pub fn auth<S: Into<String>>(reason: S) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Create an authorization error with a custom reason
    pub fn authz<S: Into<String>>(reason: S) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Create a rate limit error with a custom reason
    pub fn rate_limited<S: Into<String>>(reason: S) -> Self {
        Self::RateLimitExceeded {
            reason: reason.into(),
        }
    }

    /// Create an identity provider error with a custom message
    pub fn identity_provider<S: Into<String>>(message: S) -> Self {
        Self::IdentityProvider {
            message: message.into(),
        }
    }

    /// Create an analytics sink error with a custom message
    pub fn analytics<S: Into<String>>(message: S) -> Self {
        Self::Analytics {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error for a specific request field
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, reason: S) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::IdentityProvider { .. } => StatusCode::BAD_GATEWAY,
            Self::Analytics { .. } => StatusCode::BAD_GATEWAY,
            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::IdentityProvider { .. } => "identity_provider_error",
            Self::Analytics { .. } => "analytics_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::HttpClient { .. } => "http_client_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient {
            message: err.to_string(),
        }
    }
}

/// Errors render as `{"error": {"code", "message", "type"}}` with the mapped status.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::auth("invalid token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::authz("insufficient permissions").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::rate_limited("Too Many Requests").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::identity_provider("token endpoint returned 500").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(GatewayError::config("x").error_type(), "configuration_error");
        assert_eq!(GatewayError::analytics("x").error_type(), "analytics_error");
        assert_eq!(
            GatewayError::validation("code", "missing").error_type(),
            "request_validation_error"
        );
    }

    #[test]
    fn test_display_includes_reason() {
        let err = GatewayError::authz("Access Denied. Please check your token");
        assert_eq!(
            err.to_string(),
            "Authorization failed: Access Denied. Please check your token"
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = GatewayError::auth("Unauthorized").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
