//! # Trigger-Gate Core
//!
//! Core evaluation engine for the Trigger-Gate webhook interceptor service.
//!
//! This crate decides, for an incoming webhook event, whether it is authentic
//! and admissible and which extension fields should flow downstream. It
//! contains:
//!
//! - the shared request/response envelope exchanged with interceptors
//! - a bounded, TTL-expiring [`SecretCache`] in front of a pluggable
//!   [`SecretStore`]
//! - a CEL expression engine with webhook-specific extension functions
//! - the built-in interceptors (`cel`, `github`, `gitlab`, `bitbucket`, `slack`)
//!
//! ## Architecture
//!
//! - Interceptors depend only on trait abstractions ([`Interceptor`],
//!   [`SecretStore`], [`Clock`])
//! - Infrastructure implementations are injected at start-up
//! - Every interceptor failure is reported in-band through a [`Status`]
//!
//! ## Usage
//!
//! ```rust
//! use trigger_gate_core::{InterceptorResponse, StatusCode};
//!
//! let rejected =
//!     InterceptorResponse::fail(StatusCode::FailedPrecondition, "event type push is not allowed");
//! assert!(!rejected.continue_processing);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status Types
// ============================================================================

/// Status codes an interceptor may report when it rejects an event.
///
/// The numeric values follow the gRPC status code numbering so that responses
/// stay wire compatible with other interceptor implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum StatusCode {
    /// Malformed input: bad parameters, bad expression syntax, missing header.
    InvalidArgument,
    /// Referenced secret or secret key does not exist.
    NotFound,
    /// Well-formed input that fails a business rule.
    FailedPrecondition,
    /// Engine or serialization defect.
    Internal,
    /// Request could not be authenticated.
    Unauthenticated,
}

impl StatusCode {
    /// Numeric wire value of the code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::InvalidArgument => 3,
            Self::NotFound => 5,
            Self::FailedPrecondition => 9,
            Self::Internal => 13,
            Self::Unauthenticated => 16,
        }
    }

    /// Human readable name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Internal => "Internal",
            Self::Unauthenticated => "Unauthenticated",
        }
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::InvalidArgument),
            5 => Ok(Self::NotFound),
            9 => Ok(Self::FailedPrecondition),
            13 => Ok(Self::Internal),
            16 => Ok(Self::Unauthenticated),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a numeric status code is outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported status code: {0}")]
pub struct UnknownStatusCode(pub i32);

/// Rejection status carried by an [`InterceptorResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Classification of the failure.
    pub code: StatusCode,

    /// Human readable explanation. Never contains secret material.
    #[serde(default)]
    pub message: String,
}

impl Status {
    /// Create a new status.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// HTTP header helpers shared by the expression engine and the verifiers
pub mod headers;

/// Secret references, secret stores and the TTL secret cache
pub mod secrets;

/// CEL expression engine
pub mod cel;

/// Interceptor envelope types and built-in interceptors
pub mod interceptors;

/// Infrastructure implementations of the secret store
pub mod adapters;

// Re-export key types for convenience
pub use adapters::{FilesystemSecretStore, InMemorySecretStore};
pub use interceptors::{
    chain::{run_chain, ChainOutcome},
    Interceptor, InterceptorRequest, InterceptorResponse, TriggerContext,
};
pub use secrets::{
    cache::{CacheStatistics, Clock, ManualClock, SecretCache, SystemClock},
    SecretData, SecretError, SecretRef, SecretStore, SecretStoreError, SecretValue,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
