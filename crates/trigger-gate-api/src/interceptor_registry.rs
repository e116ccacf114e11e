//! Interceptor registry for path based dispatch.
//!
//! [`InterceptorRegistry`] associates interceptor names (e.g. `"cel"`,
//! `"github"`) with their [`Interceptor`] implementations. The registry is
//! built once at startup and used read-only during request handling.
//!
//! # URL Structure
//!
//! Each registered interceptor is reachable at:
//! ```text
//! POST /{interceptor_name}
//! ```

use crate::errors::ConfigError;
use std::{collections::HashMap, sync::Arc};
use trigger_gate_core::{
    interceptors::{builtin_interceptor, Interceptor},
    secrets::SecretResolver,
};

// ============================================================================
// InterceptorName
// ============================================================================

/// URL-safe name of an interceptor.
///
/// A name must consist entirely of lowercase ASCII letters, digits, hyphens
/// (`-`), or underscores (`_`). It must not be empty.
///
/// # Examples
///
/// ```rust
/// use trigger_gate_api::interceptor_registry::InterceptorName;
///
/// let name = InterceptorName::new("github").unwrap();
/// assert_eq!(name.as_str(), "github");
///
/// assert!(InterceptorName::new("GitHub").is_err()); // uppercase not allowed
/// assert!(InterceptorName::new("").is_err());       // empty not allowed
/// assert!(InterceptorName::new("../cel").is_err()); // slashes not allowed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterceptorName(String);

impl InterceptorName {
    /// Create a new `InterceptorName`, validating it contains only URL-safe characters.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInterceptorNameError::Empty`] if the value is empty.
    /// Returns [`InvalidInterceptorNameError::InvalidChars`] if the value
    /// contains characters outside `[a-z0-9\-_]`.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidInterceptorNameError> {
        let s = value.into();
        if s.is_empty() {
            return Err(InvalidInterceptorNameError::Empty);
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(InvalidInterceptorNameError::InvalidChars { value: s });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InterceptorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when an [`InterceptorName`] cannot be created.
#[derive(Debug, thiserror::Error)]
pub enum InvalidInterceptorNameError {
    #[error("Interceptor name must not be empty")]
    Empty,

    #[error(
        "Interceptor name '{value}' contains invalid characters; \
         use lowercase alphanumeric, hyphens, or underscores"
    )]
    InvalidChars { value: String },
}

// ============================================================================
// InterceptorRegistry
// ============================================================================

/// Normalise a request path into an interceptor lookup key.
///
/// Surrounding whitespace and one leading `/` are removed and the result is
/// lowercased.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    trimmed
        .strip_prefix('/')
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// Registry mapping interceptor names to implementations.
///
/// Values are stored as `Arc<dyn Interceptor>` so they can be shared across
/// request tasks.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    interceptors: HashMap<String, Arc<dyn Interceptor>>,
}

impl InterceptorRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding the built-in interceptors named in `names`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownInterceptor`] for a name that is not a
    /// built-in interceptor.
    pub fn with_builtins(names: &[String], resolver: &SecretResolver) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for name in names {
            let interceptor = builtin_interceptor(name, resolver.clone())
                .ok_or_else(|| ConfigError::UnknownInterceptor { name: name.clone() })?;
            let name = InterceptorName::new(name.as_str()).map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })?;
            registry.register(name, interceptor);
        }
        Ok(registry)
    }

    /// Register an interceptor, replacing any existing one with the same name.
    pub fn register(
        &mut self,
        name: InterceptorName,
        interceptor: Arc<dyn Interceptor>,
    ) -> &mut Self {
        self.interceptors.insert(name.0, interceptor);
        self
    }

    /// Look up an interceptor by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Interceptor>> {
        self.interceptors.get(name).cloned()
    }

    /// Look up an interceptor by request path, see [`normalize_path`].
    pub fn resolve_path(&self, path: &str) -> Option<Arc<dyn Interceptor>> {
        self.get(&normalize_path(path))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interceptors.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.interceptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("interceptors", &self.names())
            .finish()
    }
}

#[cfg(test)]
#[path = "interceptor_registry_tests.rs"]
mod tests;
