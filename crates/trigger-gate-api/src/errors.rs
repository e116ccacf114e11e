//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};

/// Message returned when a path names no registered interceptor.
pub const UNKNOWN_INTERCEPTOR_MESSAGE: &str = "path did not match any interceptors";

/// Dispatcher errors with HTTP status code mapping
///
/// Interceptor rejections are not errors here: they travel in-band inside a
/// `200` response. This type covers protocol level failures only:
///
/// - `400 Bad Request`: the path and method name no interceptor, or the body
///   is not an interceptor request
/// - `500 Internal Server Error`: the interceptor missed its deadline or the
///   response could not be serialized
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request path does not name a registered interceptor
    ///
    /// Maps to: `400 Bad Request`
    #[error("path did not match any interceptors")]
    UnknownInterceptor { path: String },

    /// The body is not a valid interceptor request
    ///
    /// Maps to: `400 Bad Request`
    #[error("failed to parse body as InterceptorRequest: {message}")]
    InvalidRequest { message: String },

    /// The interceptor did not answer within the configured deadline
    ///
    /// Maps to: `500 Internal Server Error`
    #[error("interceptor {interceptor} timed out after {timeout_ms}ms")]
    Timeout { interceptor: String, timeout_ms: u128 },

    /// The interceptor response could not be encoded
    ///
    /// Maps to: `500 Internal Server Error`
    #[error("failed to encode interceptor response: {message}")]
    Serialization { message: String },
}

impl DispatchError {
    /// HTTP status code reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownInterceptor { .. } | Self::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Timeout { .. } | Self::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::UnknownInterceptor { path } => {
                warn!(path = %path, "No interceptor registered for path");
            }
            Self::InvalidRequest { message } => {
                warn!(error = %message, "Rejected malformed interceptor request");
            }
            Self::Timeout {
                interceptor,
                timeout_ms,
            } => {
                warn!(
                    interceptor = %interceptor,
                    timeout_ms = *timeout_ms,
                    "Interceptor timed out"
                );
            }
            Self::Serialization { message } => {
                error!(error = %message, "Failed to encode interceptor response");
            }
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Unknown interceptor '{name}'")]
    UnknownInterceptor { name: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
