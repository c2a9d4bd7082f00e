//! # fieldlink-store: Persistence Layer for FieldLink
//!
//! Everything the client keeps on the device goes through this crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FieldLink Data Flow                              │
//! │                                                                         │
//! │  fieldlink-sync (queue, refresher, client facade)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 fieldlink-store (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌─────────────┐  ┌─────────────┐           │   │
//! │  │   │   TtlCache    │  │ ActionStore │  │ Credential- │           │   │
//! │  │   │  (cache.rs)   │  │ (actions.rs)│  │ Store       │           │   │
//! │  │   └───────┬───────┘  └──────┬──────┘  └──────┬──────┘           │   │
//! │  │           └─────────────────┼────────────────┘                  │   │
//! │  │                             ▼                                   │   │
//! │  │            dyn KeyValueStore (kv.rs)                            │   │
//! │  │             ├── Database (SQLite, pool.rs)                      │   │
//! │  │             └── MemoryStore (memory.rs)                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fieldlink_store::{Database, DbConfig, TtlCache};
//!
//! let db = Database::new(DbConfig::new("fieldlink.db")).await?;
//! let cache = TtlCache::new(Arc::new(db));
//! cache.set("orders", &orders, None).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod actions;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod pool;

// =============================================================================
// Re-exports
// =============================================================================

pub use actions::{ActionStore, ACTION_QUEUE_KEY};
pub use cache::{TtlCache, DEFAULT_NAMESPACE, DEFAULT_TTL};
pub use credentials::CredentialStore;
pub use error::{StoreError, StoreResult};
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
