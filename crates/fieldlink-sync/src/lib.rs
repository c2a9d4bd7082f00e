//! # fieldlink-sync: Resilient API Client
//!
//! The network layer of the FieldLink agent app. It keeps the app usable on
//! an intermittent radio link: reads fall back to a TTL cache, mutating
//! actions taken offline are queued and replayed, and an expired access
//! token is refreshed exactly once no matter how many requests hit the 401.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Client Architecture                            │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    FieldClient (caller facade)                   │  │
//! │  └───────┬──────────────────────┬───────────────────────┬───────────┘  │
//! │          ▼                      ▼                       ▼              │
//! │  ┌────────────────┐   ┌──────────────────┐   ┌────────────────────┐   │
//! │  │ TokenRefresher │   │   OfflineQueue   │   │  NetworkMonitor    │   │
//! │  │                │   │                  │   │                    │   │
//! │  │ single-flight  │◄──│ ActionExecutor   │◄──│ reconnect edges    │   │
//! │  │ refresh, one   │   │ FIFO drain,      │   │ (report / attach / │   │
//! │  │ replay per req │   │ retry counting   │   │  HealthProbe)      │   │
//! │  └───────┬────────┘   └────────┬─────────┘   └────────────────────┘   │
//! │          ▼                     ▼                                       │
//! │  ┌────────────────┐   ┌──────────────────────────────────────────┐    │
//! │  │  HttpClient    │   │ fieldlink-store: TtlCache, ActionStore   │    │
//! │  │  (reqwest)     │   │ (SQLite or in-memory key-value store)    │    │
//! │  └────────────────┘   └──────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`client`] - `FieldClient` facade and builder
//! - [`auth`] - Single-flight token refresh and session lifecycle
//! - [`http`] - Request dispatch and response classification
//! - [`network`] - Connectivity state, subscriptions, health probe
//! - [`queue`] - Persisted offline action queue
//! - [`executor`] - Maps queued actions to backend calls
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Client error taxonomy

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod network;
pub mod queue;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{RefreshPhase, TokenRefresher};
pub use client::{open_store, CacheResult, CacheSource, FieldClient, FieldClientBuilder, PerformOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use executor::{ActionExecutor, HttpActionExecutor};
pub use http::{ApiRequest, ApiResponse, HttpClient, Method};
pub use network::{ConnectivityEvent, ConnectivitySubscription, HealthProbe, NetworkMonitor};
pub use queue::{DrainOutcome, DrainReport, OfflineQueue, QueueEvent};

/// Crate version, sent in the default User-Agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
