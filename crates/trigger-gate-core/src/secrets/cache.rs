//! # Secret Cache
//!
//! Bounded, TTL-expiring cache in front of a [`SecretStore`].
//!
//! Entries are keyed by (namespace, secret name, secret key). Only successful
//! lookups are cached; a missing secret or key is reported every time so that
//! a newly created secret becomes visible on the next request. Once the cache
//! holds `capacity` entries the least recently used one is evicted.

use super::{SecretError, SecretRef, SecretStore, SecretValue};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

// ============================================================================
// Clock
// ============================================================================

/// Source of monotonic time for cache expiry.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

// ============================================================================
// Configuration and statistics
// ============================================================================

/// Secret cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretCacheConfig {
    /// Lifetime of a cached entry.
    pub ttl: Duration,

    /// Maximum number of cached entries.
    pub capacity: NonZeroUsize,
}

impl Default for SecretCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            capacity: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Cache performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStatistics {
    /// Entries currently held, including ones that expired but were not looked up since.
    pub entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that went to the backing store.
    pub misses: u64,

    /// Expired entries removed on lookup.
    pub expired_removed: u64,
}

// ============================================================================
// SecretCache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    namespace: String,
    name: String,
    key: String,
}

struct CacheEntry {
    value: SecretValue,
    inserted_at: Instant,
}

/// TTL and LRU bounded cache of resolved secret values.
///
/// Safe for concurrent use. Two callers missing on the same key at the same
/// time both read the store; the later insert wins.
pub struct SecretCache {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_removed: AtomicU64,
}

impl SecretCache {
    /// Create a cache over `store`.
    pub fn new(
        store: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        config: SecretCacheConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ttl: config.ttl,
            entries: Mutex::new(LruCache::new(config.capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
        }
    }

    /// Create a cache with the system clock and default settings.
    pub fn with_defaults(store: Arc<dyn SecretStore>) -> Self {
        Self::new(store, Arc::new(SystemClock), SecretCacheConfig::default())
    }

    /// Configured entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `secret_ref` in `namespace`.
    ///
    /// The namespace override carried by `secret_ref` is ignored here; callers
    /// pass the already resolved namespace.
    ///
    /// # Errors
    /// - `SecretError::InvalidReference` - Empty secret name or key
    /// - `SecretError::NotFound` - The secret does not exist
    /// - `SecretError::KeyNotFound` - The secret exists without the requested key
    /// - `SecretError::Store` - The backing store failed
    pub async fn get(
        &self,
        namespace: &str,
        secret_ref: &SecretRef,
    ) -> Result<SecretValue, SecretError> {
        if secret_ref.secret_name.is_empty() {
            return Err(SecretError::InvalidReference {
                message: "secret name is empty".to_string(),
            });
        }
        if secret_ref.secret_key.is_empty() {
            return Err(SecretError::InvalidReference {
                message: format!("secret key is empty for secret {}", secret_ref.secret_name),
            });
        }

        let cache_key = CacheKey {
            namespace: namespace.to_string(),
            name: secret_ref.secret_name.clone(),
            key: secret_ref.secret_key.clone(),
        };

        if let Some(value) = self.lookup(&cache_key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        debug!(
            namespace = %namespace,
            secret_name = %secret_ref.secret_name,
            "Secret cache miss, reading from store"
        );

        let data = self
            .store
            .get_secret(namespace, &secret_ref.secret_name)
            .await?
            .ok_or_else(|| SecretError::NotFound {
                namespace: namespace.to_string(),
                name: secret_ref.secret_name.clone(),
            })?;

        let value = data
            .get(&secret_ref.secret_key)
            .cloned()
            .ok_or_else(|| SecretError::KeyNotFound {
                namespace: namespace.to_string(),
                name: secret_ref.secret_name.clone(),
                key: secret_ref.secret_key.clone(),
            })?;

        let entry = CacheEntry {
            value: value.clone(),
            inserted_at: self.clock.now(),
        };
        self.entries.lock().put(cache_key, entry);

        Ok(value)
    }

    fn lookup(&self, cache_key: &CacheKey) -> Option<SecretValue> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(cache_key) {
            Some(entry) if now.saturating_duration_since(entry.inserted_at) < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(cache_key);
            self.expired_removed.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current cache counters.
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            entries: self.entries.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("ttl", &self.ttl)
            .field("statistics", &self.statistics())
            .finish()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
