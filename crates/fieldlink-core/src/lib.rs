//! # fieldlink-core: Pure Types for FieldLink
//!
//! This crate holds the types every other FieldLink crate agrees on. It
//! performs no I/O: persistence lives in `fieldlink-store`, network calls in
//! `fieldlink-sync`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FieldLink Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Field-agent app (screens, forms)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            fieldlink-sync (HTTP, refresh, queue, network)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              fieldlink-store (key-value, TTL cache)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fieldlink-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌─────────┐  │   │
//! │  │   │   types    │  │   clock    │  │ validation │  │  error  │  │   │
//! │  │   │ Offline-   │  │ SystemClock│  │ payload    │  │ Core-   │  │   │
//! │  │   │ Action     │  │ ManualClock│  │ rules      │  │ Error   │  │   │
//! │  │   │ CacheItem  │  │            │  │            │  │         │  │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘  └─────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Offline actions, cache envelope, credentials
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//! - [`validation`] - Payload validation for queued actions

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of failed replays after which an offline action is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Maximum length of an order identifier accepted into the queue.
pub const MAX_ORDER_ID_LEN: usize = 64;

/// Maximum length of free-text fields (notes, rejection reasons).
pub const MAX_NOTE_LEN: usize = 500;
