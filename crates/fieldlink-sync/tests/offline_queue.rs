//! Offline queue behavior across connectivity changes and restarts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldlink_core::{AgentStatus, ManualClock, OfflineAction, OfflineActionKind};
use fieldlink_store::{Database, DbConfig, KeyValueStore};
use fieldlink_sync::{
    ActionExecutor, ClientConfig, ClientError, ClientResult, DrainOutcome, FieldClient,
    PerformOutcome, QueueEvent,
};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn next_drain_report(events: &mut broadcast::Receiver<QueueEvent>) -> fieldlink_sync::DrainReport {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let QueueEvent::DrainFinished(report) = events.recv().await.unwrap() {
                return report;
            }
        }
    })
    .await
    .expect("drain did not finish")
}

#[tokio::test]
async fn offline_status_update_replays_on_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/agents/me/status"))
        .and(body_json(json!({ "status": "on_duty" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = FieldClient::builder(ClientConfig::with_base_url(server.uri()))
        .build()
        .unwrap();
    client.start().await;
    let mut events = client.events();

    client.report_connectivity(false);
    let outcome = client
        .perform(OfflineActionKind::UpdateStatus {
            status: AgentStatus::OnDuty,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, PerformOutcome::Queued(_)));
    assert_eq!(client.pending_action_count().await.unwrap(), 1);

    client.report_connectivity(true);
    let report = next_drain_report(&mut events).await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(client.pending_action_count().await.unwrap(), 0);
    client.shutdown().await;
}

#[tokio::test]
async fn action_failing_every_attempt_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders/ord-1/accept"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = ClientConfig::with_base_url(server.uri());
    config.queue.max_retries = 3;
    let client = FieldClient::builder(config).build().unwrap();
    let mut events = client.events();

    let id = client
        .enqueue_offline(OfflineActionKind::AcceptOrder {
            order_id: "ord-1".into(),
        })
        .await
        .unwrap();

    for expected_remaining in [1, 1, 0] {
        let DrainOutcome::Completed(report) = client.force_sync().await else {
            panic!("no other drain should be running");
        };
        assert_eq!(report.remaining, expected_remaining);
    }

    // Never attempted again.
    client.force_sync().await;
    assert_eq!(client.pending_action_count().await.unwrap(), 0);

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::ActionDropped { action, error } = event {
            dropped = Some((action, error));
        }
    }
    let (action, error) = dropped.expect("drop event");
    assert_eq!(action.id, id);
    match error {
        ClientError::PermanentActionFailure {
            attempts, last_error, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("boom"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

/// Sleeps inside `execute` and records the peak number of concurrent calls.
#[derive(Default)]
struct SlowExecutor {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ActionExecutor for SlowExecutor {
    async fn execute(&self, _action: &OfflineAction) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn rapid_reconnects_run_one_drain_at_a_time() {
    let executor = Arc::new(SlowExecutor::default());
    let client = FieldClient::builder(ClientConfig::with_base_url("http://127.0.0.1:9"))
        .with_executor(executor.clone())
        .build()
        .unwrap();
    client.start().await;
    let mut events = client.events();

    client.report_connectivity(false);
    client
        .enqueue_offline(OfflineActionKind::AcceptOrder {
            order_id: "ord-1".into(),
        })
        .await
        .unwrap();

    client.report_connectivity(true);
    client.report_connectivity(false);
    client.report_connectivity(true);

    // Let the watcher start the first drain, then pile on a manual one.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.force_sync().await, DrainOutcome::AlreadyRunning);

    let report = next_drain_report(&mut events).await;
    assert_eq!(report.succeeded, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
    client.shutdown().await;
}

#[tokio::test]
async fn queued_actions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldlink.db");
    let config = ClientConfig::with_base_url("http://127.0.0.1:9");

    let id = {
        let db = Database::new(DbConfig::new(&db_path)).await.unwrap();
        let client = FieldClient::builder(config.clone())
            .with_store(Arc::new(db.clone()))
            .build()
            .unwrap();
        client.report_connectivity(false);
        let id = client
            .enqueue_offline(OfflineActionKind::RejectOrder {
                order_id: "ord-7".into(),
                reason: Some("vehicle breakdown".into()),
            })
            .await
            .unwrap();
        db.close().await;
        id
    };

    let db = Database::new(DbConfig::new(&db_path)).await.unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(db);
    let executor = Arc::new(SlowExecutor::default());
    let client = FieldClient::builder(config)
        .with_store(store)
        .with_executor(executor.clone())
        .build()
        .unwrap();

    let pending = client.queue().pending_actions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].retry_count, 0);
    assert_eq!(pending[0].kind.order_id(), Some("ord-7"));

    let mut events = client.events();
    client.start().await;
    let report = next_drain_report(&mut events).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    client.shutdown().await;
}

#[tokio::test]
async fn cache_maintenance_never_loses_queued_actions() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("fieldlink.db")))
        .await
        .unwrap();
    let clock = ManualClock::default();
    let client = FieldClient::builder(ClientConfig::with_base_url("http://127.0.0.1:9"))
        .with_store(Arc::new(db.clone()))
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    client.report_connectivity(false);

    client
        .enqueue_offline(OfflineActionKind::AcceptOrder {
            order_id: "ord-1".into(),
        })
        .await
        .unwrap();
    client.set_cached("orders", &json!([]), None).await;

    // Every cache entry is long expired; the queued action is not.
    clock.advance(Duration::from_secs(6 * 3600));
    client.set_cached("offline_queue", &json!({ "x": 1 }), None).await;
    assert!(client.cache().purge_expired().await >= 1);
    client.cache().clear().await;
    client.logout().await;

    let pending = client.queue().pending_actions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind.order_id(), Some("ord-1"));
    db.close().await;
}

#[tokio::test]
async fn action_past_retention_is_dropped_with_event() {
    let executor = Arc::new(SlowExecutor::default());
    let clock = ManualClock::default();
    let mut config = ClientConfig::with_base_url("http://127.0.0.1:9");
    config.queue.retention_hours = 720;
    let client = FieldClient::builder(config)
        .with_clock(Arc::new(clock.clone()))
        .with_executor(executor.clone())
        .build()
        .unwrap();
    let mut events = client.events();

    let id = client
        .enqueue_offline(OfflineActionKind::AcceptOrder {
            order_id: "ord-1".into(),
        })
        .await
        .unwrap();

    clock.advance(Duration::from_secs(721 * 3600));

    // Still visible until a drain disposes of it.
    assert_eq!(client.pending_action_count().await.unwrap(), 1);

    let DrainOutcome::Completed(report) = client.force_sync().await else {
        panic!("no other drain should be running");
    };
    assert_eq!(report.dropped, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::ActionDropped { action, error } = event {
            dropped = Some((action, error));
        }
    }
    let (action, error) = dropped.expect("drop event");
    assert_eq!(action.id, id);
    assert!(matches!(error, ClientError::ActionDiscarded { .. }));
}
