//! # Network State Monitor
//!
//! Tracks the last known connectivity state and fans platform signals out to
//! subscribers.
//!
//! ## Signal Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Connectivity Signals                               │
//! │                                                                         │
//! │  Platform callback ──► report(bool)                                    │
//! │  Stream<bool>      ──► attach(stream)  ─┐                              │
//! │  HealthProbe       ──► report(bool)    ─┤                              │
//! │                                         ▼                              │
//! │                      ┌────────────────────────────────┐                │
//! │                      │ NetworkMonitor                  │                │
//! │                      │  online: AtomicBool (init true) │                │
//! │                      └───────┬───────────────┬─────────┘                │
//! │                              │               │                          │
//! │                every signal  │               │ offline → online only    │
//! │                              ▼               ▼                          │
//! │              on_change callbacks      reconnections()                   │
//! │              subscribe() receivers    (drives queue drain)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The monitor starts **online**. Until the first signal arrives requests go
//! out normally instead of being queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::NetworkSettings;
use crate::http::HttpClient;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Connectivity Event
// =============================================================================

/// One observed connectivity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub online: bool,
    /// State before this signal.
    pub previous: bool,
    pub observed_at: DateTime<Utc>,
}

impl ConnectivityEvent {
    /// Offline → online edge.
    pub fn is_reconnect(&self) -> bool {
        self.online && !self.previous
    }

    /// Online → offline edge.
    pub fn is_disconnect(&self) -> bool {
        !self.online && self.previous
    }
}

type Callback = Arc<dyn Fn(ConnectivityEvent) + Send + Sync>;

// =============================================================================
// NetworkMonitor
// =============================================================================

/// Shared connectivity state. Cheap to clone.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    online: AtomicBool,
    changes: broadcast::Sender<ConnectivityEvent>,
    reconnects: broadcast::Sender<ConnectivityEvent>,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// Creates a monitor in the optimistic online state.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (reconnects, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MonitorInner {
                online: AtomicBool::new(true),
                changes,
                reconnects,
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Last known state.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Feeds one platform signal.
    ///
    /// Every signal is delivered to subscribers, repeated states included.
    /// The reconnect channel only fires on the offline → online edge.
    pub fn report(&self, online: bool) -> ConnectivityEvent {
        let previous = self.inner.online.swap(online, Ordering::SeqCst);
        let event = ConnectivityEvent {
            online,
            previous,
            observed_at: Utc::now(),
        };

        if event.is_reconnect() {
            info!("Connectivity restored");
            let _ = self.inner.reconnects.send(event);
        } else if event.is_disconnect() {
            info!("Connectivity lost");
        } else {
            debug!(online, "Connectivity signal (no change)");
        }

        let _ = self.inner.changes.send(event);

        let callbacks: Vec<Callback> = self
            .inner
            .lock_callbacks()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }

        event
    }

    /// Receiver of every signal. No synthetic initial event.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.changes.subscribe()
    }

    /// Receiver of offline → online edges only.
    pub fn reconnections(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.reconnects.subscribe()
    }

    /// Registers a callback run synchronously inside [`report`](Self::report).
    ///
    /// The callback stays registered until the returned subscription is
    /// unsubscribed or dropped.
    pub fn on_change<F>(&self, callback: F) -> ConnectivitySubscription
    where
        F: Fn(ConnectivityEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock_callbacks().push((id, Arc::new(callback)));
        ConnectivitySubscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_callbacks().len()
    }

    /// Consumes a platform signal stream on a background task until the
    /// stream ends or `cancel` fires.
    pub fn attach<S>(&self, signals: S, cancel: CancellationToken) -> JoinHandle<()>
    where
        S: Stream<Item = bool> + Send + 'static,
    {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut signals = Box::pin(signals);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = signals.next() => match next {
                        Some(online) => {
                            monitor.report(online);
                        }
                        None => {
                            debug!("Connectivity signal stream ended");
                            break;
                        }
                    },
                }
            }
        })
    }
}

impl MonitorInner {
    fn lock_callbacks(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Callback)>> {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// ConnectivitySubscription
// =============================================================================

/// Handle for a callback registered with [`NetworkMonitor::on_change`].
#[derive(Debug)]
pub struct ConnectivitySubscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl ConnectivitySubscription {
    /// Removes the callback.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for ConnectivitySubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.lock_callbacks().retain(|(id, _)| *id != self.id);
        }
    }
}

// =============================================================================
// HealthProbe
// =============================================================================

/// Polls a health endpoint and reports the result to a monitor.
///
/// ## Poll Interval
/// ```text
/// online   → fixed interval (probe_interval_secs)
/// offline  → exponential backoff from the interval up to probe_max_interval_secs
/// success  → backoff reset
/// ```
#[derive(Debug, Clone)]
pub struct HealthProbe {
    http: Arc<HttpClient>,
    monitor: NetworkMonitor,
    path: String,
    interval: Duration,
    max_interval: Duration,
}

impl HealthProbe {
    pub fn new(http: Arc<HttpClient>, monitor: NetworkMonitor, settings: &NetworkSettings) -> Self {
        Self {
            http,
            monitor,
            path: settings.probe_path.clone(),
            interval: Duration::from_secs(settings.probe_interval_secs),
            max_interval: Duration::from_secs(settings.probe_max_interval_secs),
        }
    }

    /// Probes once and reports the result.
    pub async fn check_once(&self) -> bool {
        let online = self.http.probe(&self.path).await;
        self.monitor.report(online);
        online
    }

    /// Runs the probe loop on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(path = %self.path, "Health probe starting");
            let mut backoff = self.create_backoff();

            loop {
                let wait = if self.check_once().await {
                    backoff.reset();
                    self.interval
                } else {
                    backoff.next_backoff().unwrap_or(self.max_interval)
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => break,
                }
            }

            info!("Health probe stopped");
        })
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.interval,
            initial_interval: self.interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_starts_online() {
        assert!(NetworkMonitor::new().is_online());
    }

    #[test]
    fn test_callbacks_see_every_signal() {
        let monitor = NetworkMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = monitor.on_change(move |e| sink.lock().unwrap().push(e.online));

        monitor.report(true);
        monitor.report(false);
        monitor.report(false);
        monitor.report(true);

        assert_eq!(*seen.lock().unwrap(), vec![true, false, false, true]);
    }

    #[test]
    fn test_unsubscribe_and_drop_remove_callback() {
        let monitor = NetworkMonitor::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let sub = monitor.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        monitor.report(false);
        sub.unsubscribe();
        monitor.report(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        {
            let counter = Arc::clone(&calls);
            let _scoped = monitor.on_change(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(monitor.subscriber_count(), 1);
        }
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_drop_other_subscription() {
        let monitor = NetworkMonitor::new();
        let held = Arc::new(Mutex::new(None::<ConnectivitySubscription>));

        let slot = Arc::clone(&held);
        *held.lock().unwrap() = Some(monitor.on_change(move |_| {
            slot.lock().unwrap().take();
        }));

        monitor.report(false);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_edges_only() {
        let monitor = NetworkMonitor::new();
        let mut edges = monitor.reconnections();
        let mut all = monitor.subscribe();

        monitor.report(true); // already online: not an edge
        monitor.report(false);
        monitor.report(true); // edge
        monitor.report(true);

        let edge = edges.recv().await.unwrap();
        assert!(edge.is_reconnect());
        assert!(edges.try_recv().is_err());

        let mut count = 0;
        while all.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_attach_consumes_stream() {
        let monitor = NetworkMonitor::new();
        let mut edges = monitor.reconnections();

        let signals = futures_util::stream::iter(vec![false, true]);
        let handle = monitor.attach(signals, CancellationToken::new());
        handle.await.unwrap();

        assert!(monitor.is_online());
        assert!(edges.recv().await.unwrap().is_reconnect());
    }

    #[tokio::test]
    async fn test_attach_stops_on_cancel() {
        let monitor = NetworkMonitor::new();
        let cancel = CancellationToken::new();
        let handle = monitor.attach(futures_util::stream::pending::<bool>(), cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
    }
}
