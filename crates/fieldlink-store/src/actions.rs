//! # Action Store
//!
//! Persists the offline action list under its own key, outside the cache
//! namespace. Cache clears, purges and TTLs never reach it.
//!
//! Unlike [`crate::TtlCache`] and [`crate::CredentialStore`], every failure is
//! surfaced. The queue must be able to tell "nothing queued" apart from
//! "could not read", or a single failed read would be written back as an
//! empty list.
//!
//! ```text
//! load()
//!   ├── Ok(None)          → []           (nothing queued)
//!   ├── Ok(Some(raw))     → decode
//!   │     ├── ok          → Vec<OfflineAction>
//!   │     └── err         → StoreError::Serialization, raw value left in place
//!   └── Err(e)            → e            (caller must not write)
//! ```

use std::sync::Arc;

use fieldlink_core::OfflineAction;
use tracing::{debug, error};

use crate::error::StoreResult;
use crate::kv::KeyValueStore;

/// Storage key of the persisted action list.
pub const ACTION_QUEUE_KEY: &str = "queue:offline_actions";

/// Typed view over [`ACTION_QUEUE_KEY`].
#[derive(Debug, Clone)]
pub struct ActionStore {
    store: Arc<dyn KeyValueStore>,
}

impl ActionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads the list, oldest first. An absent key is an empty list.
    pub async fn load(&self) -> StoreResult<Vec<OfflineAction>> {
        let Some(raw) = self.store.get(ACTION_QUEUE_KEY).await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&raw).map_err(|e| {
            error!(
                key = ACTION_QUEUE_KEY,
                bytes = raw.len(),
                error = %e,
                "Stored action list is undecodable, leaving it in place"
            );
            e.into()
        })
    }

    /// Replaces the list. An empty list removes the key.
    pub async fn save(&self, actions: &[OfflineAction]) -> StoreResult<()> {
        if actions.is_empty() {
            self.store.remove(ACTION_QUEUE_KEY).await?;
        } else {
            let encoded = serde_json::to_string(actions)?;
            self.store.set(ACTION_QUEUE_KEY, &encoded).await?;
        }
        debug!(count = actions.len(), "Action list persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::error::StoreError;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use fieldlink_core::OfflineActionKind;

    fn action(order: &str) -> OfflineAction {
        OfflineAction::new(
            OfflineActionKind::AcceptOrder {
                order_id: order.to_string(),
            },
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_load_and_empty_removes_key() {
        let store = Arc::new(MemoryStore::new());
        let actions = ActionStore::new(store.clone());

        assert!(actions.load().await.unwrap().is_empty());

        let list = vec![action("ord-1"), action("ord-2")];
        actions.save(&list).await.unwrap();
        let loaded = actions.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, list[0].id);

        actions.save(&[]).await.unwrap();
        assert!(store.get(ACTION_QUEUE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_list_is_an_error_and_kept() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACTION_QUEUE_KEY, "{\"x\":1}").await.unwrap();
        let actions = ActionStore::new(store.clone());

        let err = actions.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert_eq!(
            store.get(ACTION_QUEUE_KEY).await.unwrap().as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[tokio::test]
    async fn test_cache_maintenance_never_touches_list() {
        let store = Arc::new(MemoryStore::new());
        let actions = ActionStore::new(store.clone());
        actions.save(&[action("ord-1")]).await.unwrap();

        let cache = TtlCache::new(store.clone());
        cache.set("offline_queue", &serde_json::json!({ "x": 1 }), None).await;
        cache.purge_expired().await;
        cache.clear().await;

        assert_eq!(actions.load().await.unwrap().len(), 1);
    }
}
