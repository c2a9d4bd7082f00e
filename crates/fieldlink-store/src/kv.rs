//! # Key-Value Store Trait
//!
//! The storage seam every higher layer writes through. Values are opaque
//! strings (JSON in practice); keys are flat and namespaced by prefix:
//!
//! ```text
//! cache:<key>            → CacheItem<T>
//! queue:offline_actions  → Vec<OfflineAction>
//! auth:access_token      → String
//! auth:refresh_token     → String
//! ```

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Async string key-value storage.
///
/// Implemented by [`crate::Database`] (SQLite) and [`crate::MemoryStore`].
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Reads a value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Inserts or replaces a value.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists every key starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
