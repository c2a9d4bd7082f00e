//! # Field Client
//!
//! The caller-facing API of the crate. Wires the cache, refresh coordinator,
//! network monitor and offline queue together and owns their background tasks.
//!
//! ## Component Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            FieldClient                                  │
//! │                                                                         │
//! │   request / get_json / fetch_cached                                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   TokenRefresher ──► HttpClient ──► backend                            │
//! │        ▲                                                                │
//! │        │ HttpActionExecutor                                             │
//! │        │                                                                │
//! │   perform(kind)                                                        │
//! │     ├── offline ─────────────────────► OfflineQueue::enqueue           │
//! │     └── online ─► execute                                              │
//! │                     ├── Ok               → Sent                        │
//! │                     ├── transient error  → enqueue → Queued(id)        │
//! │                     └── other error      → Err                         │
//! │                                                                         │
//! │   start():   OfflineQueue::watch(monitor)   drains on reconnect edge   │
//! │              HealthProbe::spawn             (if probe_enabled)         │
//! │   shutdown(): cancel token, join tasks                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let config = ClientConfig::load_or_default(None);
//! let store = open_store(&config).await?;
//! let client = FieldClientBuilder::new(config).with_store(store).build()?;
//! client.restore_session().await;
//! client.start().await;
//!
//! match client.perform(OfflineActionKind::AcceptOrder { order_id }).await? {
//!     PerformOutcome::Sent => {}
//!     PerformOutcome::Queued(id) => show_pending_badge(id),
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldlink_core::validation::validate_action;
use fieldlink_core::{ActionId, Clock, OfflineAction, OfflineActionKind, SystemClock};
use fieldlink_store::{
    ActionStore, CredentialStore, Database, DbConfig, KeyValueStore, MemoryStore, TtlCache,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::TokenRefresher;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::executor::{ActionExecutor, HttpActionExecutor};
use crate::http::{ApiRequest, ApiResponse, HttpClient, Method};
use crate::network::{ConnectivityEvent, ConnectivitySubscription, HealthProbe, NetworkMonitor};
use crate::queue::{DrainOutcome, OfflineQueue, QueueEvent};

// =============================================================================
// Result Types
// =============================================================================

/// What [`FieldClient::perform`] did with an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerformOutcome {
    /// The backend accepted it.
    Sent,
    /// It was stored for replay on the next reconnect.
    Queued(ActionId),
}

/// Where [`FieldClient::fetch_cached`] data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Fresh from the backend (and now cached).
    Network,
    /// Backend unreachable; served from the cache.
    Offline,
}

/// Data plus its provenance.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
    pub data: T,
    pub source: CacheSource,
    /// When the cached copy was written. `None` for network data.
    pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
    pub fn from_network(data: T) -> Self {
        Self {
            data,
            source: CacheSource::Network,
            cached_at: None,
        }
    }

    pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            source: CacheSource::Offline,
            cached_at: Some(cached_at),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.source == CacheSource::Offline
    }
}

// =============================================================================
// Storage Setup
// =============================================================================

/// Opens the key-value backend named by the `[storage]` section.
///
/// Falls back to an in-memory store when no database path can be resolved
/// (no platform data dir).
pub async fn open_store(config: &ClientConfig) -> ClientResult<Arc<dyn KeyValueStore>> {
    match config.database_path() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ClientError::Storage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            let db = Database::new(DbConfig::new(path)).await?;
            Ok(Arc::new(db))
        }
        None => {
            warn!("No database path available, using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

// =============================================================================
// FieldClient
// =============================================================================

struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Resilient API client. Cheap to clone.
#[derive(Clone)]
pub struct FieldClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    http: Arc<HttpClient>,
    refresher: TokenRefresher,
    monitor: NetworkMonitor,
    cache: TtlCache,
    queue: OfflineQueue,
    executor: Arc<dyn ActionExecutor>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl std::fmt::Debug for FieldClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldClient")
            .field("base_url", &self.inner.http.base_url())
            .field("online", &self.inner.monitor.is_online())
            .finish()
    }
}

impl FieldClient {
    /// Builder with the given configuration.
    pub fn builder(config: ClientConfig) -> FieldClientBuilder {
        FieldClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn monitor(&self) -> &NetworkMonitor {
        &self.inner.monitor
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.inner.refresher
    }

    pub fn cache(&self) -> &TtlCache {
        &self.inner.cache
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.inner.queue
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Sends an arbitrary request through the refresh coordinator.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<ApiResponse> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.inner.refresher.request(&request).await
    }

    /// `GET path`, decoded into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.inner
            .refresher
            .request(&ApiRequest::get(path))
            .await?
            .json()
    }

    /// Network-first read with cache fallback.
    ///
    /// ## Behavior
    /// - Online: `GET path`; on success the body is cached under `path` for
    ///   `ttl` (or the default) and returned with [`CacheSource::Network`].
    /// - Online, transient failure: the cached copy if one is still valid,
    ///   else the original error.
    /// - Offline: the cached copy, else [`ClientError::Offline`].
    ///
    /// Non-transient failures (4xx, auth) are never masked by the cache.
    pub async fn fetch_cached<T>(&self, path: &str, ttl: Option<Duration>) -> ClientResult<CacheResult<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.inner.monitor.is_online() {
            return self
                .cached_copy(path)
                .await
                .ok_or_else(|| ClientError::Offline(path.to_string()));
        }

        match self.get_json::<T>(path).await {
            Ok(data) => {
                self.inner.cache.set(path, &data, ttl).await;
                Ok(CacheResult::from_network(data))
            }
            Err(e) if e.is_transient() => {
                debug!(path, error = %e, "Fetch failed, trying cache");
                self.cached_copy(path).await.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn cached_copy<T: DeserializeOwned>(&self, path: &str) -> Option<CacheResult<T>> {
        self.inner
            .cache
            .get_entry::<T>(path)
            .await
            .map(|entry| CacheResult::offline(entry.data, entry.written_at))
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Queues an action for the next drain without trying the network.
    pub async fn enqueue_offline(&self, kind: OfflineActionKind) -> ClientResult<ActionId> {
        self.inner.queue.enqueue(kind).await
    }

    /// Sends an action now if possible, otherwise queues it.
    pub async fn perform(&self, kind: OfflineActionKind) -> ClientResult<PerformOutcome> {
        validate_action(&kind)?;

        if !self.inner.monitor.is_online() {
            return self.enqueue_offline(kind).await.map(PerformOutcome::Queued);
        }

        let now = self.inner.cache.clock().now();
        let action = OfflineAction::new(kind, self.inner.config.queue.max_retries, now);

        match self.inner.executor.execute(&action).await {
            Ok(()) => Ok(PerformOutcome::Sent),
            Err(e) if e.is_transient() => {
                info!(kind = action.kind.name(), error = %e, "Send failed, queueing for later");
                self.enqueue_offline(action.kind).await.map(PerformOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Drains the queue now, whatever the connectivity state.
    pub async fn force_sync(&self) -> DrainOutcome {
        self.inner.queue.drain().await
    }

    pub async fn pending_action_count(&self) -> ClientResult<usize> {
        self.inner.queue.pending_count().await
    }

    /// Drops every queued action unsent, announcing each as `ActionDropped`.
    ///
    /// Logging out leaves the queue alone; call this first when the departing
    /// agent's unsent work must not be replayed under the next session.
    pub async fn discard_pending_actions(&self, reason: &str) -> ClientResult<usize> {
        self.inner.queue.discard_all(reason).await
    }

    /// Queue progress events.
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.queue.events()
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    /// Feeds a platform connectivity signal.
    pub fn report_connectivity(&self, online: bool) -> ConnectivityEvent {
        self.inner.monitor.report(online)
    }

    pub fn on_connectivity_change<F>(&self, callback: F) -> ConnectivitySubscription
    where
        F: Fn(ConnectivityEvent) + Send + Sync + 'static,
    {
        self.inner.monitor.on_change(callback)
    }

    // =========================================================================
    // Cache
    // =========================================================================

    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inner.cache.get(key).await
    }

    pub async fn set_cached<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        self.inner.cache.set(key, value, ttl).await
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn login(&self, identifier: &str, secret: &str) -> ClientResult<()> {
        self.inner.refresher.login(identifier, secret).await
    }

    /// Ends the session and wipes the response cache. Queued actions stay.
    pub async fn logout(&self) {
        self.inner.refresher.logout().await;
        self.inner.cache.clear().await;
    }

    pub async fn restore_session(&self) -> bool {
        self.inner.refresher.restore_session().await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawns the reconnect watcher (and the health probe, if enabled).
    ///
    /// Also kicks one drain when actions from a previous run are waiting.
    /// Calling `start` twice is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.is_some() {
            debug!("Client already started");
            return;
        }

        let cancel = CancellationToken::new();
        let mut handles = vec![self.inner.queue.watch(&self.inner.monitor, cancel.clone())];

        if self.inner.config.network.probe_enabled {
            let probe = HealthProbe::new(
                self.inner.http.clone(),
                self.inner.monitor.clone(),
                &self.inner.config.network,
            );
            handles.push(probe.spawn(cancel.clone()));
        }

        let pending = self.inner.queue.pending_count().await.unwrap_or(0);
        if pending > 0 && self.inner.monitor.is_online() {
            info!(pending, "Replaying actions left from previous run");
            let queue = self.inner.queue.clone();
            handles.push(tokio::spawn(async move {
                queue.drain().await;
            }));
        }

        info!(base_url = %self.inner.http.base_url(), "Field client started");
        *tasks = Some(BackgroundTasks { cancel, handles });
    }

    /// Stops background tasks and waits for them.
    pub async fn shutdown(&self) {
        let Some(tasks) = self.inner.tasks.lock().await.take() else {
            return;
        };

        tasks.cancel.cancel();
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Field client stopped");
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`FieldClient`].
pub struct FieldClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    monitor: Option<NetworkMonitor>,
    executor: Option<Arc<dyn ActionExecutor>>,
}

impl FieldClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        FieldClientBuilder {
            config,
            store: None,
            clock: None,
            monitor: None,
            executor: None,
        }
    }

    /// Sets the persistence backend. Defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Shares an existing monitor (e.g. one already attached to a platform
    /// signal).
    pub fn with_monitor(mut self, monitor: NetworkMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replaces the HTTP executor used for queued and immediate actions.
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validates the config and assembles the client.
    pub fn build(self) -> ClientResult<FieldClient> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let monitor = self.monitor.unwrap_or_default();

        let http = Arc::new(HttpClient::new(&self.config)?);
        let refresher = TokenRefresher::new(
            http.clone(),
            CredentialStore::new(store.clone()),
            self.config.auth.clone(),
        );

        let cache = TtlCache::new(store.clone())
            .with_clock(clock.clone())
            .with_namespace(self.config.cache.namespace.clone())
            .with_default_ttl(self.config.cache_ttl());

        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(HttpActionExecutor::new(refresher.clone())));

        let queue = OfflineQueue::new(
            ActionStore::new(store),
            clock,
            executor.clone(),
            self.config.queue.max_retries,
            self.config.queue_retention(),
        );

        Ok(FieldClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                http,
                refresher,
                monitor,
                cache,
                queue,
                executor,
                tasks: Mutex::new(None),
            }),
        })
    }
}
