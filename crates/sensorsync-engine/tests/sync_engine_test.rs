//! Integration tests for the synchronization engine
//!
//! The engine runs against an in-memory store, a scripted registry and a
//! recording link sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sensorsync_core::{
    decode, IdentityRecord, InternalCommand, LocalStore, MemoryStore, MessageType, SensorReport,
    StoreError, StoreResult, SyncKey,
};
use sensorsync_engine::{
    Disposition, EngineConfig, LinkSink, OutboundWriter, SyncEngine, TimeFormat, TransportError,
};
use sensorsync_registry::testing::{Script, ScriptedRegistry};
use sensorsync_registry::RegistryClient;

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

#[async_trait]
impl LinkSink for RecordingSink {
    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    store: Arc<MemoryStore>,
    registry: Arc<ScriptedRegistry>,
    sink: Arc<RecordingSink>,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    fn with_store(store: MemoryStore) -> Self {
        Self::build(store, EngineConfig::default(), Duration::from_secs(5))
    }

    fn build(store: MemoryStore, config: EngineConfig, timeout: Duration) -> Self {
        let store = Arc::new(store);
        let registry = Arc::new(ScriptedRegistry::new());
        let client = RegistryClient::with_timeout(registry.clone(), timeout);
        let writer = Arc::new(OutboundWriter::new());
        let sink = Arc::new(RecordingSink::default());
        writer.attach(sink.clone());

        let engine = Arc::new(SyncEngine::new(config, store.clone(), Some(client), writer));
        Self {
            engine,
            store,
            registry,
            sink,
        }
    }
}

/// Memory store whose identity inserts always fail
#[derive(Default)]
struct ReadOnlyIdentities {
    inner: MemoryStore,
}

#[async_trait]
impl LocalStore for ReadOnlyIdentities {
    async fn find_identity(&self, key: &SyncKey) -> StoreResult<Option<IdentityRecord>> {
        self.inner.find_identity(key).await
    }

    async fn insert_identity(&self, _record: IdentityRecord) -> StoreResult<()> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )))
    }

    async fn update_identity(&self, record: IdentityRecord) -> StoreResult<bool> {
        self.inner.update_identity(record).await
    }

    async fn insert_report(&self, report: SensorReport) -> StoreResult<()> {
        self.inner.insert_report(report).await
    }

    async fn find_reports(&self, key: &SyncKey) -> StoreResult<Vec<SensorReport>> {
        self.inner.find_reports(key).await
    }

    async fn radio_addresses(&self) -> StoreResult<Vec<u8>> {
        self.inner.radio_addresses().await
    }

    async fn insert_radio_address(&self, address: u8) -> StoreResult<()> {
        self.inner.insert_radio_address(address).await
    }
}

async fn wait_for_reports(store: &MemoryStore, count: usize) {
    for _ in 0..200 {
        if store.report_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} reports, have {}", count, store.report_count());
}

fn key(node: u8, child: u8, sensor: u8) -> SyncKey {
    SyncKey::new("user", node, child, sensor)
}

// =============================================================================
// SetVariable
// =============================================================================

#[tokio::test]
async fn test_first_report_creates_device() {
    let h = Harness::new();
    h.registry
        .push(Script::json(200, r#"{"uuid":"abc","token":"tok"}"#));

    let disposition = h.engine.handle_line("10;1;1;0;23.5").await;
    assert_eq!(
        disposition,
        Disposition::Synced {
            sync_key: key(10, 1, 0),
            created: true
        }
    );

    let requests = h.registry.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path(), "/devices");
    assert_eq!(requests[0].field("sensorValue"), Some("23.5"));

    let record = h.store.find_identity(&key(10, 1, 0)).await.unwrap().unwrap();
    assert_eq!(record.remote_id, "abc");
    assert_eq!(record.remote_token, "tok");

    let reports = h.store.find_reports(&key(10, 1, 0)).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].synced);
    assert_eq!(reports[0].value, "23.5");
}

#[tokio::test]
async fn test_second_report_updates_device() {
    let h = Harness::new();

    h.engine.handle_line("10;1;1;0;23.5").await;
    let disposition = h.engine.handle_line("10;1;1;0;24.0").await;

    assert_eq!(
        disposition,
        Disposition::Synced {
            sync_key: key(10, 1, 0),
            created: false
        }
    );
    assert_eq!(h.registry.create_calls(), 1);
    assert_eq!(h.registry.update_calls(), 1);
    assert_eq!(h.store.identity_count(), 1);

    let update = &h.registry.requests()[1];
    assert_eq!(update.path(), "/devices/device-1");
    assert_eq!(update.field("token"), Some("token-1"));

    let record = h.store.find_identity(&key(10, 1, 0)).await.unwrap().unwrap();
    assert_eq!(record.last_value.as_deref(), Some("24.0"));
}

#[tokio::test]
async fn test_distinct_streams_get_distinct_devices() {
    let h = Harness::new();

    h.engine.handle_line("10;1;1;0;23.5").await;
    h.engine.handle_line("10;2;1;0;19.0").await;
    h.engine.handle_line("10;1;1;1;45").await;

    assert_eq!(h.registry.create_calls(), 3);
    assert_eq!(h.store.identity_count(), 3);
}

#[tokio::test]
async fn test_concurrent_reports_create_once() {
    let h = Harness::new();
    h.registry.set_latency(Duration::from_millis(20));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.handle_line(&format!("7;3;1;2;{}", i)).await })
        })
        .collect();
    let results = futures::future::join_all(tasks).await;

    let created = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|d| matches!(d, Disposition::Synced { created: true, .. }))
        .count();

    assert_eq!(created, 1);
    assert_eq!(h.registry.create_calls(), 1);
    assert_eq!(h.registry.update_calls(), 15);
    assert_eq!(h.store.identity_count(), 1);
    assert_eq!(h.store.report_count(), 16);
}

#[tokio::test]
async fn test_create_failure_stores_unsynced_report() {
    let h = Harness::new();
    h.registry.push(Script::json(500, r#"{"error":"db down"}"#));

    let disposition = h.engine.handle_line("10;1;1;0;23.5").await;
    assert_eq!(
        disposition,
        Disposition::Unsynced {
            sync_key: key(10, 1, 0)
        }
    );
    assert!(h.store.find_identity(&key(10, 1, 0)).await.unwrap().is_none());

    let reports = h.store.find_reports(&key(10, 1, 0)).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].synced);

    // The next report retries creation
    let disposition = h.engine.handle_line("10;1;1;0;23.6").await;
    assert!(matches!(disposition, Disposition::Synced { created: true, .. }));
    assert_eq!(h.registry.create_calls(), 2);
}

#[tokio::test]
async fn test_update_failure_keeps_identity() {
    let h = Harness::new();
    h.engine.handle_line("10;1;1;0;23.5").await;
    let before = h.store.find_identity(&key(10, 1, 0)).await.unwrap().unwrap();

    h.registry.push(Script::Fail("connection reset".into()));
    let disposition = h.engine.handle_line("10;1;1;0;99").await;
    assert!(matches!(disposition, Disposition::Unsynced { .. }));

    let after = h.store.find_identity(&key(10, 1, 0)).await.unwrap().unwrap();
    assert_eq!(after, before);

    let reports = h.store.find_reports(&key(10, 1, 0)).await.unwrap();
    assert_eq!(
        reports.iter().map(|r| r.synced).collect::<Vec<_>>(),
        vec![true, false]
    );

    // A later report updates the same device
    h.engine.handle_line("10;1;1;0;100").await;
    assert_eq!(h.registry.create_calls(), 1);
    assert_eq!(h.registry.requests()[2].path(), "/devices/device-1");
}

#[tokio::test(start_paused = true)]
async fn test_hung_registry_times_out() {
    let h = Harness::build(
        MemoryStore::new(),
        EngineConfig::default(),
        Duration::from_secs(2),
    );
    h.registry.push(Script::Hang);

    let disposition = h.engine.handle_line("10;1;1;0;23.5").await;
    assert!(matches!(disposition, Disposition::Unsynced { .. }));
    assert_eq!(h.store.identity_count(), 0);
    assert_eq!(h.store.report_count(), 1);
}

#[tokio::test]
async fn test_log_only_mode() {
    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::new(
        EngineConfig::default(),
        store.clone(),
        None,
        Arc::new(OutboundWriter::new()),
    );
    assert!(engine.is_log_only());

    let disposition = engine.handle_line("10;1;1;0;23.5").await;
    assert_eq!(
        disposition,
        Disposition::Recorded {
            sync_key: key(10, 1, 0)
        }
    );
    assert_eq!(store.identity_count(), 0);
    let reports = store.find_reports(&key(10, 1, 0)).await.unwrap();
    assert!(!reports[0].synced);
}

#[tokio::test]
async fn test_unrecorded_identity_leaves_report_unsynced() {
    let store = Arc::new(ReadOnlyIdentities::default());
    let registry = Arc::new(ScriptedRegistry::new());
    let engine = SyncEngine::new(
        EngineConfig::default(),
        store.clone(),
        Some(RegistryClient::new(registry.clone())),
        Arc::new(OutboundWriter::new()),
    );

    let disposition = engine.handle_line("10;1;1;0;23.5").await;
    assert_eq!(
        disposition,
        Disposition::Unsynced {
            sync_key: key(10, 1, 0)
        }
    );
    assert_eq!(registry.create_calls(), 1);

    let reports = store.find_reports(&key(10, 1, 0)).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].synced);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submitted_reports_apply_in_arrival_order() {
    let h = Harness::new();
    h.registry.set_latency(Duration::from_millis(1));

    for i in 0..50 {
        h.engine.submit_line(&format!("7;3;1;2;{}", i));
    }
    wait_for_reports(&h.store, 50).await;

    let values: Vec<String> = h
        .registry
        .requests()
        .iter()
        .filter_map(|r| r.field("sensorValue").map(str::to_string))
        .collect();
    let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
    assert_eq!(values, expected);
    assert_eq!(h.registry.create_calls(), 1);

    let record = h.store.find_identity(&key(7, 3, 2)).await.unwrap().unwrap();
    assert_eq!(record.last_value.as_deref(), Some("49"));

    let stored: Vec<String> = h
        .store
        .find_reports(&key(7, 3, 2))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.value)
        .collect();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_submitted_malformed_line_is_dropped() {
    let h = Harness::new();
    h.engine.submit_line("nonsense");
    h.engine.submit_line("5;2;4;3;");

    for _ in 0..100 {
        if !h.sink.lines().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let lines = h.sink.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("5;2;4;3;"));
}

// =============================================================================
// Internal
// =============================================================================

#[tokio::test]
async fn test_time_request() {
    let h = Harness::new();
    let received = Utc::now().timestamp_millis();

    let disposition = h.engine.handle_line("5;2;4;3;").await;
    assert!(matches!(disposition, Disposition::Replied(_)));

    let lines = h.sink.lines();
    assert_eq!(lines.len(), 1);
    let reply = decode(&lines[0]).unwrap();
    assert_eq!(reply.node_address, 5);
    assert_eq!(reply.child_address, 2);
    assert_eq!(reply.message_type, MessageType::Internal);
    assert_eq!(reply.internal_command(), Some(InternalCommand::Time));
    let time: i64 = reply.payload.parse().unwrap();
    assert!(time >= received);
}

#[tokio::test]
async fn test_time_request_in_seconds() {
    let config = EngineConfig {
        time_format: TimeFormat::Seconds,
        ..EngineConfig::default()
    };
    let h = Harness::build(MemoryStore::new(), config, Duration::from_secs(5));
    let received = Utc::now().timestamp();

    h.engine.handle_line("5;2;4;3;").await;
    let reply = decode(&h.sink.lines()[0]).unwrap();
    let time: i64 = reply.payload.parse().unwrap();
    assert!(time >= received && time < received + 60);
}

#[tokio::test]
async fn test_unit_request_does_not_allocate() {
    let h = Harness::new();

    h.engine.handle_line("5;2;4;13;").await;

    assert_eq!(h.sink.lines(), vec!["5;2;4;13;0\n".to_string()]);
    assert!(h.store.radio_addresses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_address_request() {
    let h = Harness::with_store(MemoryStore::with_radio_addresses([3, 7, 2]));

    let disposition = h.engine.handle_line("255;255;4;5;").await;
    match disposition {
        Disposition::Replied(reply) => assert_eq!(reply.payload, "8"),
        other => panic!("unexpected disposition: {:?}", other),
    }
    h.engine.handle_line("255;255;4;5;").await;

    assert_eq!(
        h.sink.lines(),
        vec!["255;255;4;5;8\n".to_string(), "255;255;4;5;9\n".to_string()]
    );
    assert_eq!(h.store.radio_addresses().await.unwrap(), vec![2, 3, 7, 8, 9]);
}

#[tokio::test]
async fn test_concurrent_address_requests() {
    let h = Harness::new();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.handle_line("255;255;4;5;").await })
        })
        .collect();
    futures::future::join_all(tasks).await;

    let mut addresses: Vec<u8> = h
        .sink
        .lines()
        .iter()
        .map(|l| decode(l).unwrap().payload.parse().unwrap())
        .collect();
    addresses.sort_unstable();
    assert_eq!(addresses, (1..=10).collect::<Vec<u8>>());
}

#[tokio::test]
async fn test_reply_without_link_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::new(
        EngineConfig::default(),
        store,
        None,
        Arc::new(OutboundWriter::new()),
    );

    let disposition = engine.handle_line("5;2;4;3;").await;
    assert!(matches!(disposition, Disposition::Dropped(_)));
}

#[tokio::test]
async fn test_unhandled_internal_commands_are_ignored() {
    let h = Harness::new();
    for line in ["0;0;4;11;read: 1-1-0", "0;0;4;4;1.4", "3;255;4;0;87", "3;255;4;9;", "3;255;4;99;"] {
        assert_eq!(h.engine.handle_line(line).await, Disposition::Ignored, "{}", line);
    }
    assert!(h.sink.lines().is_empty());
}

// =============================================================================
// Other message types
// =============================================================================

#[tokio::test]
async fn test_other_message_types_are_ignored() {
    let h = Harness::new();
    for line in ["3;0;0;6;1.4", "3;1;2;2;", "3;1;3;2;1", "3;1;9;0;x"] {
        assert_eq!(h.engine.handle_line(line).await, Disposition::Ignored, "{}", line);
    }
    assert!(h.registry.requests().is_empty());
    assert_eq!(h.store.report_count(), 0);
}

#[tokio::test]
async fn test_malformed_lines_are_dropped() {
    let h = Harness::new();
    for line in ["", "garbage", "1;2;3", "1;2;x;0;v", "1;2;1;temp;v"] {
        assert!(
            matches!(h.engine.handle_line(line).await, Disposition::Dropped(_)),
            "{:?}",
            line
        );
    }
    assert!(h.registry.requests().is_empty());

    // The engine keeps working afterwards
    assert!(matches!(
        h.engine.handle_line("10;1;1;0;1").await,
        Disposition::Synced { .. }
    ));
}
