//! # Secrets Module
//!
//! Secret references, the secret store abstraction and the resolver used by
//! interceptors to obtain webhook signing secrets.
//!
//! Secrets are addressed by the triple (namespace, secret name, secret key).
//! Every lookup goes through a [`SecretCache`](cache::SecretCache) so that a
//! burst of webhooks for the same trigger costs a single store read per TTL
//! window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub mod cache;

use cache::SecretCache;

// ============================================================================
// Core Types
// ============================================================================

/// Reference to a single key inside a namespaced secret.
///
/// Two references with the same effective namespace, name and key are
/// interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the secret object.
    #[serde(default)]
    pub secret_name: String,

    /// Key inside the secret's data.
    #[serde(default)]
    pub secret_key: String,

    /// Explicit namespace; when absent the caller's namespace is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretRef {
    /// Create a reference without a namespace override.
    pub fn new(secret_name: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            secret_key: secret_key.into(),
            namespace: None,
        }
    }

    /// Set an explicit namespace override.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Namespace the reference resolves in when looked up from `fallback`.
    ///
    /// An explicit, non-empty namespace on the reference always wins.
    pub fn effective_namespace<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => fallback,
        }
    }
}

/// Secure container for secret bytes.
///
/// The buffer is zeroed when the last copy is dropped and the value is never
/// included in `Debug` output.
#[derive(Clone)]
pub struct SecretValue {
    inner: Zeroizing<Vec<u8>>,
}

impl SecretValue {
    /// Create secret value from bytes
    pub fn from_bytes(value: Vec<u8>) -> Self {
        Self {
            inner: Zeroizing::new(value),
        }
    }

    /// Create secret value from a string
    pub fn from_string(value: String) -> Self {
        Self::from_bytes(value.into_bytes())
    }

    /// Get secret as bytes
    ///
    /// # Security Warning
    /// The returned slice contains the actual secret value.
    /// Use immediately and avoid copying it into long-lived buffers.
    pub fn expose_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get secret length without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Compare `candidate` with the secret in constant time.
    ///
    /// Only the length of the secret can be learned from timing.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        self.inner.as_slice().ct_eq(candidate).into()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::from_bytes(value.as_bytes().to_vec())
    }
}

/// Keyed data of one secret object, as returned by a [`SecretStore`].
pub type SecretData = HashMap<String, SecretValue>;

// ============================================================================
// Interface Traits
// ============================================================================

/// Backing store for secrets.
///
/// Implementations fetch a whole secret object by namespace and name. A
/// missing secret is `Ok(None)`; errors are reserved for store failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret `name` in `namespace`.
    ///
    /// # Errors
    /// - `SecretStoreError::Unavailable` - Store unreachable
    /// - `SecretStoreError::AccessDenied` - Insufficient permissions
    /// - `SecretStoreError::InvalidName` - Namespace or name cannot be addressed
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretData>, SecretStoreError>;
}

// ============================================================================
// SecretResolver
// ============================================================================

/// Resolves [`SecretRef`]s for interceptors through the shared cache.
///
/// The namespace rule is the same for every call site:
///
/// 1. an explicit namespace (on the reference, or the third argument of the
///    CEL `compareSecret` function) wins;
/// 2. otherwise the namespace parsed from the trigger ID of the request;
/// 3. otherwise the configured default namespace.
#[derive(Clone)]
pub struct SecretResolver {
    cache: Arc<SecretCache>,
    default_namespace: String,
}

impl SecretResolver {
    /// Create a resolver over `cache` falling back to `default_namespace`.
    pub fn new(cache: Arc<SecretCache>, default_namespace: impl Into<String>) -> Self {
        Self {
            cache,
            default_namespace: default_namespace.into(),
        }
    }

    /// Namespace a reference resolves in for a request from `trigger_namespace`.
    pub fn namespace_for<'a>(
        &'a self,
        secret_ref: &'a SecretRef,
        trigger_namespace: Option<&'a str>,
    ) -> &'a str {
        let fallback = match trigger_namespace {
            Some(ns) if !ns.is_empty() => ns,
            _ => self.default_namespace.as_str(),
        };
        secret_ref.effective_namespace(fallback)
    }

    /// Resolve a secret value.
    ///
    /// # Errors
    ///
    /// Propagates [`SecretError`] from the cache.
    pub async fn resolve(
        &self,
        secret_ref: &SecretRef,
        trigger_namespace: Option<&str>,
    ) -> Result<SecretValue, SecretError> {
        let namespace = self.namespace_for(secret_ref, trigger_namespace);
        self.cache.get(namespace, secret_ref).await
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned when resolving a secret reference.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("key {key} not found in secret {namespace}/{name}")]
    KeyNotFound {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("invalid secret reference: {message}")]
    InvalidReference { message: String },

    #[error("secret store failure: {0}")]
    Store(#[from] SecretStoreError),
}

impl SecretError {
    /// Check if the error means the referenced secret or key does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::KeyNotFound { .. })
    }
}

/// Errors raised by a [`SecretStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret store unavailable: {message}")]
    Unavailable { message: String },

    #[error("access denied to secret {namespace}/{name}: {reason}")]
    AccessDenied {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("invalid secret address: {value} - {reason}")]
    InvalidName { value: String, reason: String },
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
