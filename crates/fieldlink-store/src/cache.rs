//! # TTL Cache Store
//!
//! Typed, time-bounded cache over any [`KeyValueStore`].
//!
//! ## Read Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get("orders")                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  store.get("cache:orders")                                              │
//! │       │                                                                 │
//! │       ├── storage error?         → warn, None                           │
//! │       ├── absent?                → None                                 │
//! │       ├── undecodable envelope?  → delete, None                         │
//! │       ├── now >= expires_at?     → delete, None                         │
//! │       │                                                                 │
//! │       └── Some(data)                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage failures never reach the caller: reads degrade to a miss and
//! writes are dropped with a warning.
//!
//! Expired entries are only evicted lazily on read or by an explicit
//! [`TtlCache::purge_expired`] pass.

use std::sync::Arc;
use std::time::Duration;

use fieldlink_core::{CacheItem, Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::kv::KeyValueStore;

/// Key prefix used unless overridden.
pub const DEFAULT_NAMESPACE: &str = "cache:";

/// TTL applied when `set` is called without one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// TtlCache
// =============================================================================

/// Namespaced cache of [`CacheItem`] envelopes.
///
/// Cheap to clone; clones share the backing store and clock.
#[derive(Debug, Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    default_ttl: Duration,
}

impl TtlCache {
    /// Creates a cache with the default namespace, TTL and system clock.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the key prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces the TTL used when none is given.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn raw_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Stores `value` under `key` for `ttl` (or the default TTL).
    ///
    /// Encoding or storage failures are logged and dropped.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let item = CacheItem::new(value, ttl.unwrap_or(self.default_ttl), self.clock.now());

        let encoded = match serde_json::to_string(&item) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value not serializable, dropping write");
                return;
            }
        };

        if let Err(e) = self.store.set(&self.raw_key(key), &encoded).await {
            warn!(key = %key, error = %e, "Cache write failed, dropping");
        }
    }

    /// Returns the live value under `key`, if any.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).await.map(|item| item.data)
    }

    /// Like [`get`](Self::get) but keeps the envelope timestamps.
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheItem<T>> {
        let raw_key = self.raw_key(key);

        let raw = match self.store.get(&raw_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let item: CacheItem<T> = match serde_json::from_str(&raw) {
            Ok(item) => item,
            Err(e) => {
                debug!(key = %key, error = %e, "Evicting undecodable cache entry");
                self.delete_quietly(&raw_key).await;
                return None;
            }
        };

        if item.is_expired(self.clock.now()) {
            debug!(key = %key, expires_at = %item.expires_at, "Evicting expired cache entry");
            self.delete_quietly(&raw_key).await;
            return None;
        }

        Some(item)
    }

    /// Deletes `key` unconditionally.
    pub async fn remove(&self, key: &str) {
        self.delete_quietly(&self.raw_key(key)).await;
    }

    /// Deletes every key in this cache's namespace. Other namespaces are untouched.
    pub async fn clear(&self) {
        let keys = self.namespaced_keys().await;
        let count = keys.len();
        for key in keys {
            self.delete_quietly(&key).await;
        }
        debug!(namespace = %self.namespace, count, "Cache cleared");
    }

    /// Number of keys stored in the namespace, expired ones included.
    pub async fn size_hint(&self) -> usize {
        self.namespaced_keys().await.len()
    }

    /// Removes every expired or undecodable entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;

        for key in self.namespaced_keys().await {
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                _ => continue,
            };

            let stale = match serde_json::from_str::<CacheItem<serde_json::Value>>(&raw) {
                Ok(item) => item.is_expired(now),
                Err(_) => true,
            };

            if stale {
                self.delete_quietly(&key).await;
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(namespace = %self.namespace, purged, "Purged expired cache entries");
        }
        purged
    }

    async fn namespaced_keys(&self) -> Vec<String> {
        match self.store.keys_with_prefix(&self.namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "Cache key scan failed");
                Vec::new()
            }
        }
    }

    async fn delete_quietly(&self, raw_key: &str) {
        if let Err(e) = self.store.remove(raw_key).await {
            warn!(key = %raw_key, error = %e, "Cache delete failed");
        }
    }
}
