//! # Offline Action Queue
//!
//! Durably stores mutating actions taken while offline and replays them in
//! order when connectivity returns.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Offline Queue Drain                                  │
//! │                                                                         │
//! │  trigger: reconnect edge (watch) or force sync                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  draining.compare_exchange(false, true)                                │
//! │       ├── already true → DrainOutcome::AlreadyRunning                  │
//! │       ▼                                                                 │
//! │  snapshot = load("queue:offline_actions")  (FIFO)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for action in snapshot:                                               │
//! │     past retention? ─► remove             → ActionDropped (discarded)  │
//! │     executor.execute(action)          ← no lock held                   │
//! │     lock(list); reload                                                 │
//! │       ├── Ok   → remove                   → ActionSynced               │
//! │       └── Err  → retry_count += 1                                      │
//! │               ├── < max_retries → keep    → ActionRetried              │
//! │               └── exhausted     → remove  → ActionDropped (error log)  │
//! │     save; unlock; then emit                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  draining = false (drop guard)            → DrainFinished              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every read-modify-write of the persisted list happens under one async
//! mutex, so an `enqueue` that lands mid-drain is never overwritten. The
//! executor runs outside that mutex, so `enqueue` never waits on the network.
//!
//! The list is never rewritten from a failed read. `enqueue` returns
//! `ClientError::Storage` instead, and a drain stops with
//! [`DrainOutcome::StorageUnavailable`]. Events are emitted only once the
//! change they describe is persisted.
//!
//! There is no timed backoff between attempts: a failed action is retried on
//! the next reconnect edge or force sync.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldlink_core::validation::validate_action;
use fieldlink_core::{ActionId, Clock, OfflineAction, OfflineActionKind};
use fieldlink_store::ActionStore;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::executor::ActionExecutor;
use crate::network::NetworkMonitor;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Events & Outcomes
// =============================================================================

/// Progress notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Enqueued {
        id: ActionId,
        kind: &'static str,
    },
    ActionSynced {
        id: ActionId,
    },
    ActionRetried {
        id: ActionId,
        retry_count: u32,
        error: ClientError,
    },
    /// Terminal: the action is gone. `error` is `PermanentActionFailure`
    /// after the last retry, `ActionDiscarded` otherwise.
    ActionDropped {
        action: OfflineAction,
        error: ClientError,
    },
    DrainFinished(DrainReport),
}

/// Tally of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub retried: usize,
    /// Exhausted or past retention.
    pub dropped: usize,
    /// Actions left in the queue afterwards (including ones enqueued mid-drain).
    pub remaining: usize,
}

/// Result of a [`OfflineQueue::drain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was active; nothing was done.
    AlreadyRunning,
    /// The persisted list could not be read or written. The drain stopped
    /// and left the stored list as it was at the last successful write.
    StorageUnavailable,
    Completed(DrainReport),
}

// =============================================================================
// OfflineQueue
// =============================================================================

/// Persisted FIFO of offline actions. Cheap to clone.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    store: ActionStore,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn ActionExecutor>,
    max_retries: u32,
    retention: Duration,
    list_lock: Mutex<()>,
    draining: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

impl fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("max_retries", &self.inner.max_retries)
            .field("retention", &self.inner.retention)
            .field("draining", &self.is_draining())
            .finish()
    }
}

/// Clears the in-progress flag however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What one drain step did to an action, applied to the report and
/// announced after the list is saved.
enum Step {
    Synced,
    Retried(u32, ClientError),
    Dropped(OfflineAction, ClientError),
}

impl OfflineQueue {
    pub fn new(
        store: ActionStore,
        clock: Arc<dyn Clock>,
        executor: Arc<dyn ActionExecutor>,
        max_retries: u32,
        retention: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(QueueInner {
                store,
                clock,
                executor,
                max_retries,
                retention,
                list_lock: Mutex::new(()),
                draining: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Subscribes to queue progress.
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Validates and appends an action. Returns without touching the network.
    ///
    /// ## Errors
    /// - `Validation` for a malformed payload
    /// - `Storage` if the list cannot be read or written; the stored list is
    ///   left untouched and the action is not queued
    pub async fn enqueue(&self, kind: OfflineActionKind) -> ClientResult<ActionId> {
        validate_action(&kind)?;

        let action = OfflineAction::new(kind, self.inner.max_retries, self.inner.clock.now());
        let id = action.id.clone();
        let kind_name = action.kind.name();

        let pending = {
            let _list = self.inner.list_lock.lock().await;
            let mut list = self.load().await?;
            list.push(action);
            self.save(&list).await?;
            list.len()
        };

        info!(id = %id, kind = kind_name, pending, "Action queued for offline replay");
        self.emit(QueueEvent::Enqueued {
            id: id.clone(),
            kind: kind_name,
        });
        Ok(id)
    }

    /// Number of actions waiting for replay.
    pub async fn pending_count(&self) -> ClientResult<usize> {
        Ok(self.load().await?.len())
    }

    /// Snapshot of the waiting actions, oldest first.
    pub async fn pending_actions(&self) -> ClientResult<Vec<OfflineAction>> {
        self.load().await
    }

    /// Removes every waiting action without replaying it. Each one gets an
    /// `ActionDropped` event carrying `ActionDiscarded { reason }`.
    pub async fn discard_all(&self, reason: &str) -> ClientResult<usize> {
        let discarded = {
            let _list = self.inner.list_lock.lock().await;
            let list = self.load().await?;
            self.save(&[]).await?;
            list
        };

        if !discarded.is_empty() {
            warn!(count = discarded.len(), reason, "Discarded queued offline actions");
        }
        let count = discarded.len();
        for action in discarded {
            let error = ClientError::ActionDiscarded {
                action_id: action.id.to_string(),
                reason: reason.to_string(),
            };
            self.emit(QueueEvent::ActionDropped { action, error });
        }
        Ok(count)
    }

    /// Replays every queued action once, oldest first.
    ///
    /// A call made while another drain is active returns
    /// [`DrainOutcome::AlreadyRunning`] immediately. Actions older than the
    /// retention period are dropped without being sent.
    pub async fn drain(&self) -> DrainOutcome {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain already in progress, skipping");
            return DrainOutcome::AlreadyRunning;
        }
        let _guard = DrainGuard(&self.inner.draining);

        let snapshot = {
            let _list = self.inner.list_lock.lock().await;
            match self.load().await {
                Ok(list) => list,
                Err(_) => return DrainOutcome::StorageUnavailable,
            }
        };

        let mut report = DrainReport::default();
        if !snapshot.is_empty() {
            info!(count = snapshot.len(), "Draining offline queue");
        }

        for action in snapshot {
            let expired = self.is_past_retention(action.enqueued_at);
            let result = if expired {
                None
            } else {
                report.attempted += 1;
                Some(self.inner.executor.execute(&action).await)
            };

            let step = {
                let _list = self.inner.list_lock.lock().await;
                let Ok(mut list) = self.load().await else {
                    return DrainOutcome::StorageUnavailable;
                };

                let Some(pos) = list.iter().position(|a| a.id == action.id) else {
                    debug!(id = %action.id, "Action removed while replaying, skipping");
                    continue;
                };

                let step = match result {
                    None => {
                        let dropped = list.remove(pos);
                        let error = ClientError::ActionDiscarded {
                            action_id: dropped.id.to_string(),
                            reason: format!(
                                "not delivered within {}h retention",
                                self.inner.retention.as_secs() / 3600
                            ),
                        };
                        Step::Dropped(dropped, error)
                    }
                    Some(Ok(())) => {
                        list.remove(pos);
                        Step::Synced
                    }
                    Some(Err(e)) => {
                        if list[pos].record_failure() {
                            let dropped = list.remove(pos);
                            let error = ClientError::PermanentActionFailure {
                                action_id: dropped.id.to_string(),
                                attempts: dropped.retry_count,
                                last_error: e.to_string(),
                            };
                            Step::Dropped(dropped, error)
                        } else {
                            Step::Retried(list[pos].retry_count, e)
                        }
                    }
                };

                if self.save(&list).await.is_err() {
                    return DrainOutcome::StorageUnavailable;
                }
                step
            };

            match step {
                Step::Synced => {
                    report.succeeded += 1;
                    debug!(id = %action.id, kind = action.kind.name(), "Offline action synced");
                    self.emit(QueueEvent::ActionSynced { id: action.id });
                }
                Step::Retried(retry_count, e) => {
                    report.retried += 1;
                    warn!(
                        id = %action.id,
                        retry_count,
                        max_retries = action.max_retries,
                        error = %e,
                        "Offline action failed, will retry on next drain"
                    );
                    self.emit(QueueEvent::ActionRetried {
                        id: action.id,
                        retry_count,
                        error: e,
                    });
                }
                Step::Dropped(dropped, e) => {
                    report.dropped += 1;
                    error!(
                        id = %dropped.id,
                        kind = dropped.kind.name(),
                        attempts = dropped.retry_count,
                        error = %e,
                        "Offline action dropped"
                    );
                    self.emit(QueueEvent::ActionDropped {
                        action: dropped,
                        error: e,
                    });
                }
            }
        }

        report.remaining = {
            let _list = self.inner.list_lock.lock().await;
            match self.load().await {
                Ok(list) => list.len(),
                Err(_) => return DrainOutcome::StorageUnavailable,
            }
        };

        if report.attempted > 0 || report.dropped > 0 {
            info!(
                succeeded = report.succeeded,
                retried = report.retried,
                dropped = report.dropped,
                remaining = report.remaining,
                "Drain finished"
            );
        }
        self.emit(QueueEvent::DrainFinished(report));

        DrainOutcome::Completed(report)
    }

    /// Drains on every offline → online edge until `cancel` fires.
    ///
    /// Each drain runs on its own task, so an edge that arrives mid-drain
    /// hits the re-entrancy guard instead of piling up behind it.
    pub fn watch(&self, monitor: &NetworkMonitor, cancel: CancellationToken) -> JoinHandle<()> {
        let mut edges = monitor.reconnections();
        let queue = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    edge = edges.recv() => match edge {
                        Ok(_) => {
                            let queue = queue.clone();
                            tokio::spawn(async move { queue.drain().await });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Reconnect watcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Reconnect watcher stopped");
        })
    }

    fn is_past_retention(&self, enqueued_at: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.inner.retention) {
            Ok(retention) => self.inner.clock.now() - enqueued_at >= retention,
            Err(_) => false,
        }
    }

    async fn load(&self) -> ClientResult<Vec<OfflineAction>> {
        self.inner.store.load().await.map_err(|e| {
            error!(error = %e, "Offline action list unreadable");
            e.into()
        })
    }

    async fn save(&self, list: &[OfflineAction]) -> ClientResult<()> {
        self.inner.store.save(list).await.map_err(|e| {
            error!(count = list.len(), error = %e, "Offline action list not persisted");
            e.into()
        })
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fieldlink_core::{AgentStatus, ManualClock};
    use fieldlink_store::{KeyValueStore, MemoryStore, StoreError, StoreResult, ACTION_QUEUE_KEY};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    /// Returns scripted results in order, then succeeds.
    #[derive(Default)]
    struct ScriptedExecutor {
        script: StdMutex<VecDeque<ClientResult<()>>>,
        calls: StdMutex<Vec<ActionId>>,
    }

    impl ScriptedExecutor {
        fn failing(times: usize) -> Self {
            let script = (0..times)
                .map(|_| Err(ClientError::Transport("connection reset".into())))
                .collect();
            Self {
                script: StdMutex::new(script),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ActionId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionExecutor for ScriptedExecutor {
        async fn execute(&self, action: &OfflineAction) -> ClientResult<()> {
            self.calls.lock().unwrap().push(action.id.clone());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    /// Memory store whose next `fail_reads` reads fail.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_reads: AtomicUsize,
    }

    impl FlakyStore {
        fn fail_next_reads(&self, n: usize) {
            self.fail_reads.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            let left = self.fail_reads.load(Ordering::SeqCst);
            if left > 0 {
                self.fail_reads.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("disk busy".into()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StoreResult<()> {
            self.inner.remove(key).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    const RETENTION: Duration = Duration::from_secs(3600);

    fn queue_on(
        store: Arc<dyn KeyValueStore>,
        executor: Arc<dyn ActionExecutor>,
        max_retries: u32,
    ) -> (OfflineQueue, ManualClock) {
        let clock = ManualClock::default();
        let queue = OfflineQueue::new(
            ActionStore::new(store),
            Arc::new(clock.clone()),
            executor,
            max_retries,
            RETENTION,
        );
        (queue, clock)
    }

    fn queue_with(executor: Arc<dyn ActionExecutor>, max_retries: u32) -> (OfflineQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (queue, _) = queue_on(store.clone(), executor, max_retries);
        (queue, store)
    }

    fn drops(events: &mut broadcast::Receiver<QueueEvent>) -> Vec<(OfflineAction, ClientError)> {
        let mut dropped = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let QueueEvent::ActionDropped { action, error } = event {
                dropped.push((action, error));
            }
        }
        dropped
    }

    fn accept(order: &str) -> OfflineActionKind {
        OfflineActionKind::AcceptOrder {
            order_id: order.to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_persists_with_zero_retries() {
        let (queue, store) = queue_with(Arc::new(ScriptedExecutor::default()), 3);

        let id = queue.enqueue(accept("ord-1")).await.unwrap();

        let raw = store.get(ACTION_QUEUE_KEY).await.unwrap().unwrap();
        let stored: Vec<OfflineAction> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].retry_count, 0);
        assert_eq!(stored[0].max_retries, 3);
        assert!(id.as_str().starts_with("accept_order-"));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_payload() {
        let (queue, _) = queue_with(Arc::new(ScriptedExecutor::default()), 3);

        let err = queue.enqueue(accept("")).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_is_fifo_and_empties_queue() {
        let executor = Arc::new(ScriptedExecutor::default());
        let (queue, store) = queue_with(executor.clone(), 3);

        let first = queue.enqueue(accept("ord-1")).await.unwrap();
        let second = queue
            .enqueue(OfflineActionKind::UpdateStatus {
                status: AgentStatus::OnBreak,
            })
            .await
            .unwrap();

        let outcome = queue.drain().await;

        assert_eq!(executor.calls(), vec![first, second]);
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 2,
                succeeded: 2,
                retried: 0,
                dropped: 0,
                remaining: 0,
            })
        );
        assert_eq!(queue.pending_count().await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_increments_retry_count() {
        let executor = Arc::new(ScriptedExecutor::failing(1));
        let (queue, _) = queue_with(executor, 3);
        queue.enqueue(accept("ord-1")).await.unwrap();

        let outcome = queue.drain().await;

        assert!(matches!(
            outcome,
            DrainOutcome::Completed(DrainReport { retried: 1, remaining: 1, .. })
        ));
        let pending = queue.pending_actions().await.unwrap();
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_action_is_dropped_with_terminal_event() {
        let executor = Arc::new(ScriptedExecutor::failing(10));
        let (queue, _) = queue_with(executor.clone(), 2);
        let mut events = queue.events();
        let id = queue.enqueue(accept("ord-1")).await.unwrap();

        queue.drain().await;
        assert_eq!(queue.pending_count().await.unwrap(), 1);

        let outcome = queue.drain().await;
        assert!(matches!(
            outcome,
            DrainOutcome::Completed(DrainReport { dropped: 1, remaining: 0, .. })
        ));

        // Gone for good: a later drain doesn't see it.
        queue.drain().await;
        assert_eq!(executor.calls().len(), 2);

        let dropped = drops(&mut events);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].0.id, id);
        assert!(matches!(
            dropped[0].1,
            ClientError::PermanentActionFailure { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_action_past_retention_is_dropped_unsent() {
        let executor = Arc::new(ScriptedExecutor::default());
        let (queue, clock) = queue_on(Arc::new(MemoryStore::new()), executor.clone(), 3);
        let mut events = queue.events();
        let old = queue.enqueue(accept("ord-1")).await.unwrap();

        clock.advance(RETENTION + Duration::from_secs(1));
        let fresh = queue.enqueue(accept("ord-2")).await.unwrap();

        let outcome = queue.drain().await;

        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 1,
                succeeded: 1,
                retried: 0,
                dropped: 1,
                remaining: 0,
            })
        );
        assert_eq!(executor.calls(), vec![fresh]);

        let dropped = drops(&mut events);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].0.id, old);
        assert!(matches!(dropped[0].1, ClientError::ActionDiscarded { .. }));
    }

    #[tokio::test]
    async fn test_failed_read_never_overwrites_list() {
        let store = Arc::new(FlakyStore::default());
        let (queue, _) = queue_on(store.clone(), Arc::new(ScriptedExecutor::default()), 3);

        queue.enqueue(accept("ord-1")).await.unwrap();
        queue.enqueue(accept("ord-2")).await.unwrap();

        store.fail_next_reads(1);
        let err = queue.enqueue(accept("ord-3")).await.unwrap_err();
        assert!(matches!(err, ClientError::Storage(_)));
        assert_eq!(queue.pending_count().await.unwrap(), 2);

        queue.enqueue(accept("ord-3")).await.unwrap();
        let orders: Vec<_> = queue
            .pending_actions()
            .await
            .unwrap()
            .iter()
            .filter_map(|a| a.kind.order_id().map(str::to_string))
            .collect();
        assert_eq!(orders, vec!["ord-1", "ord-2", "ord-3"]);
    }

    #[tokio::test]
    async fn test_drain_stops_on_unreadable_list() {
        let store = Arc::new(FlakyStore::default());
        let executor = Arc::new(ScriptedExecutor::default());
        let (queue, _) = queue_on(store.clone(), executor.clone(), 3);
        queue.enqueue(accept("ord-1")).await.unwrap();

        store.fail_next_reads(1);
        assert_eq!(queue.drain().await, DrainOutcome::StorageUnavailable);
        assert!(executor.calls().is_empty());
        assert!(!queue.is_draining());

        assert!(matches!(queue.drain().await, DrainOutcome::Completed(DrainReport { succeeded: 1, .. })));
    }

    #[tokio::test]
    async fn test_undecodable_list_is_kept_and_reported() {
        let (queue, store) = queue_with(Arc::new(ScriptedExecutor::default()), 3);
        store.set(ACTION_QUEUE_KEY, "{\"x\":1}").await.unwrap();

        assert!(matches!(queue.pending_actions().await, Err(ClientError::Storage(_))));
        assert!(matches!(
            queue.enqueue(accept("ord-1")).await,
            Err(ClientError::Storage(_))
        ));
        assert_eq!(queue.drain().await, DrainOutcome::StorageUnavailable);
        assert_eq!(
            store.get(ACTION_QUEUE_KEY).await.unwrap().as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[tokio::test]
    async fn test_discard_all_announces_every_action() {
        let executor = Arc::new(ScriptedExecutor::default());
        let (queue, _) = queue_with(executor.clone(), 3);
        let mut events = queue.events();
        let first = queue.enqueue(accept("ord-1")).await.unwrap();
        let second = queue.enqueue(accept("ord-2")).await.unwrap();

        assert_eq!(queue.discard_all("agent signed out").await.unwrap(), 2);

        assert_eq!(queue.pending_count().await.unwrap(), 0);
        let dropped = drops(&mut events);
        let ids: Vec<_> = dropped.iter().map(|(a, _)| a.id.clone()).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(dropped.iter().all(|(_, e)| matches!(
            e,
            ClientError::ActionDiscarded { reason, .. } if reason == "agent signed out"
        )));

        queue.drain().await;
        assert!(executor.calls().is_empty());
    }

    /// Blocks inside `execute` until released.
    #[derive(Default)]
    struct GateExecutor {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ActionExecutor for GateExecutor {
        async fn execute(&self, _action: &OfflineAction) -> ClientResult<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_noop() {
        let gate = Arc::new(GateExecutor::default());
        let (queue, _) = queue_with(gate.clone(), 3);
        queue.enqueue(accept("ord-1")).await.unwrap();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };
        gate.entered.notified().await;

        assert!(queue.is_draining());
        assert_eq!(queue.drain().await, DrainOutcome::AlreadyRunning);

        gate.release.notify_one();
        let outcome = running.await.unwrap();
        assert!(matches!(outcome, DrainOutcome::Completed(DrainReport { succeeded: 1, .. })));
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn test_enqueue_during_drain_is_kept() {
        let gate = Arc::new(GateExecutor::default());
        let (queue, _) = queue_with(gate.clone(), 3);
        queue.enqueue(accept("ord-1")).await.unwrap();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };
        gate.entered.notified().await;

        let late = queue.enqueue(accept("ord-2")).await.unwrap();
        gate.release.notify_one();
        let outcome = running.await.unwrap();

        assert!(matches!(outcome, DrainOutcome::Completed(DrainReport { remaining: 1, .. })));
        let pending = queue.pending_actions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late);
    }

    #[tokio::test]
    async fn test_drain_flag_cleared_when_drain_is_cancelled() {
        let gate = Arc::new(GateExecutor::default());
        let (queue, _) = queue_with(gate.clone(), 3);
        queue.enqueue(accept("ord-1")).await.unwrap();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };
        gate.entered.notified().await;
        running.abort();
        let _ = running.await;

        assert!(!queue.is_draining());
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }
}
