//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, num::NonZeroUsize, path::PathBuf, time::Duration};
use trigger_gate_core::{interceptors::BUILTIN_INTERCEPTORS, secrets::cache::SecretCacheConfig};

/// Service configuration
///
/// Every field carries a serde default so that an empty configuration
/// source yields a runnable service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Secret cache and store settings
    pub secrets: SecretsConfig,

    /// Names of the interceptors to serve
    pub interceptors: Vec<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            secrets: SecretsConfig::default(),
            interceptors: BUILTIN_INTERCEPTORS.iter().map(|s| s.to_string()).collect(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Check the configuration for values the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero timeouts or capacities and
    /// an empty default namespace, and [`ConfigError::UnknownInterceptor`]
    /// for names that are not built-in interceptors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.server.interceptor_timeout_seconds == 0 {
            return invalid("server.interceptor_timeout_seconds must be greater than zero");
        }
        if self.server.shutdown_timeout_seconds == 0 {
            return invalid("server.shutdown_timeout_seconds must be greater than zero");
        }
        if self.server.max_body_size == 0 {
            return invalid("server.max_body_size must be greater than zero");
        }
        if self.secrets.cache_ttl_seconds == 0 {
            return invalid("secrets.cache_ttl_seconds must be greater than zero");
        }
        if self.secrets.cache_capacity == 0 {
            return invalid("secrets.cache_capacity must be greater than zero");
        }
        if self.secrets.default_namespace.trim().is_empty() {
            return invalid("secrets.default_namespace must not be empty");
        }
        if let SecretStoreConfig::Filesystem { root } = &self.secrets.store {
            if root.as_os_str().is_empty() {
                return invalid("secrets.store.root must not be empty");
            }
        }

        let mut seen = HashSet::new();
        for name in &self.interceptors {
            if !BUILTIN_INTERCEPTORS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownInterceptor { name: name.clone() });
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("interceptor '{name}' is listed more than once"),
                });
            }
        }

        Ok(())
    }

    /// Timeout applied to a single interceptor call.
    pub fn interceptor_timeout(&self) -> Duration {
        Duration::from_secs(self.server.interceptor_timeout_seconds)
    }

    /// Secret cache settings. Zero values fall back to the cache defaults.
    pub fn cache_config(&self) -> SecretCacheConfig {
        let defaults = SecretCacheConfig::default();
        SecretCacheConfig {
            ttl: match self.secrets.cache_ttl_seconds {
                0 => defaults.ttl,
                secs => Duration::from_secs(secs),
            },
            capacity: NonZeroUsize::new(self.secrets.cache_capacity).unwrap_or(defaults.capacity),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Deadline for a single interceptor call in seconds
    pub interceptor_timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            interceptor_timeout_seconds: 3,
            shutdown_timeout_seconds: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Secret resolution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Lifetime of a cached secret in seconds
    pub cache_ttl_seconds: u64,

    /// Maximum number of cached secret keys
    pub cache_capacity: usize,

    /// Namespace used when neither the reference nor the trigger names one
    pub default_namespace: String,

    /// Backing secret store
    pub store: SecretStoreConfig,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 5,
            cache_capacity: 1024,
            default_namespace: "default".to_string(),
            store: SecretStoreConfig::default(),
        }
    }
}

/// Backing store for secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretStoreConfig {
    /// Mounted secrets laid out as `<root>/<namespace>/<name>/<key>`
    Filesystem {
        #[serde(default = "default_secret_root")]
        root: PathBuf,
    },

    /// Process local store, empty at start-up
    Memory,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self::Filesystem {
            root: default_secret_root(),
        }
    }
}

fn default_secret_root() -> PathBuf {
    PathBuf::from("/etc/trigger-gate/secrets")
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
