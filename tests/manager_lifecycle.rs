use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde_json::json;
use kvdex::core::backend::{MemoryBackend, SyncBackend};
use kvdex::core::stats::HealthStatus;
use kvdex::maintenance::scheduler::MaintenanceTask;
use kvdex::{
    DataManager, Error, ErrorKind, EventType, ManagerConfig, OverlapPolicy, Result, StoreConfig,
    StoreSnapshot,
};

struct FailingBackend;

impl SyncBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn persist(&self, _snapshot: &StoreSnapshot) -> Result<()> {
        Err(Error::new(ErrorKind::Io, "disk full"))
    }
}

fn quiet() -> ManagerConfig {
    ManagerConfig { enable_logging: false, ..ManagerConfig::without_timers() }
}

#[tokio::test]
async fn config_from_json_drives_manager() {
    let config = ManagerConfig::from_json_str(
        r#"{"defaultStore":"game","maxStores":3,"syncInterval":0,"backupInterval":0,
            "optimizeInterval":0,"compactInterval":0,"validationInterval":0}"#,
    )
    .unwrap();
    let manager = DataManager::new(config);
    manager.init().await.unwrap();

    assert_eq!(manager.default_store_name().as_deref(), Some("game"));
    manager.create_store(StoreConfig::new("scores")).await.unwrap();
    manager.create_store(StoreConfig::new("settings")).await.unwrap();
    let err = manager.create_store(StoreConfig::new("extra")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    assert_eq!(manager.store_names(), vec!["game", "scores", "settings"]);
}

#[tokio::test]
async fn sync_all_isolates_failing_store() {
    let manager = DataManager::new(quiet());
    let good = manager.create_store(StoreConfig::new("good")).await.unwrap();
    let bad = manager.create_store(StoreConfig::new("bad")).await.unwrap();

    let backend = Arc::new(MemoryBackend::new());
    good.write().set_backend(backend.clone());
    bad.write().set_backend(Arc::new(FailingBackend));

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    manager.on("maintenance:failed", move |e| sink.lock().push(e.payload.clone()));

    let report = manager.sync_all().await.unwrap();
    assert_eq!(report.succeeded, vec!["good"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].store, "bad");
    assert_eq!(report.failed[0].kind, ErrorKind::Backend);
    assert!(!report.is_success());

    assert_eq!(backend.len(), 1);
    assert_eq!(failures.lock().len(), 1);
    assert!(good.read().last_synced().is_some());
    assert!(bad.read().last_synced().is_none());
}

#[tokio::test]
async fn backup_all_then_restore_all() {
    let manager = DataManager::new(ManagerConfig {
        enable_compression: true,
        compression_level: 3,
        ..quiet()
    });
    let saves = manager.create_store(StoreConfig::new("saves")).await.unwrap();
    let scores = manager.create_store(StoreConfig::new("scores")).await.unwrap();
    saves.write().set("slot1", json!({"hp": 10})).unwrap();
    scores.write().set("score:alice", json!(120)).unwrap();

    let report = manager.backup_all().await.unwrap();
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(manager.backup_count(), 2);

    manager.create_store(StoreConfig::new("late")).await.unwrap();
    saves.write().set("slot1", json!({"hp": 0})).unwrap();
    scores.write().clear();

    let report = manager.restore_all().await.unwrap();
    assert_eq!(report.operation, "restore");
    assert_eq!(report.skipped, vec!["late"]);
    assert_eq!(saves.read().peek("slot1"), Some(&json!({"hp": 10})));
    assert_eq!(scores.read().peek("score:alice"), Some(&json!(120)));
}

#[tokio::test]
async fn corrupted_backup_is_rejected() {
    let manager = DataManager::new(quiet());
    let store = manager.create_store(StoreConfig::new("saves")).await.unwrap();
    store.write().set("slot1", json!("abc")).unwrap();
    manager.backup_all().await.unwrap();

    let mut bytes = manager.backup_of("saves").unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    let err = manager.restore_store("saves", &bytes).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Checksum | ErrorKind::Serialization));
    assert_eq!(store.read().peek("slot1"), Some(&json!("abc")));

    let missing = manager.restore_store("nope", &bytes).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn validate_all_reports_per_store_results() {
    let manager = DataManager::new(quiet());
    let ok = manager.create_store(StoreConfig::new("ok")).await.unwrap();
    let sloppy = manager.create_store(StoreConfig::new("sloppy").with_max_size(8)).await.unwrap();
    ok.write().set("k", json!(1)).unwrap();
    sloppy.write().set("k", serde_json::Value::Null).unwrap();

    let report = manager.validate_all().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.validations.len(), 2);
    assert_eq!(report.validations["sloppy"].warning_count(), 1);
    assert!(report.invalid_stores().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timers_fire_and_stop_after_destroy() {
    let manager = DataManager::new(ManagerConfig { compact_interval: 50, ..quiet() });
    manager.init().await.unwrap();
    let store = manager.default_store().unwrap();

    let compacts = || {
        store
            .read()
            .events()
            .iter()
            .filter(|e| e.event_type == EventType::Compact)
            .count()
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(compacts(), 0);

    tokio::time::sleep(Duration::from_millis(155)).await;
    assert_eq!(compacts(), 3);

    let stats = manager.stats();
    assert_eq!(stats.tasks.len(), 1);
    assert_eq!(stats.tasks[0].task, MaintenanceTask::Compact);
    assert_eq!(stats.tasks[0].runs, 3);
    assert_eq!(stats.tasks[0].policy, OverlapPolicy::Skip);

    manager.destroy().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(compacts(), 0);
    assert!(manager.stats().tasks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_timer_degrades_health() {
    let manager = DataManager::new(ManagerConfig { sync_interval: 20, ..quiet() });
    manager.init().await.unwrap();
    manager.default_store().unwrap().write().set_backend(Arc::new(FailingBackend));
    assert_eq!(manager.health(), HealthStatus::Healthy);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let task = manager.stats().tasks.remove(0);
    assert!(task.failures >= 1);
    assert!(matches!(manager.health(), HealthStatus::Degraded(_)));

    manager.destroy().await;
    assert!(matches!(manager.health(), HealthStatus::Unhealthy(_)));
}

#[tokio::test]
async fn bus_events_for_store_lifecycle() {
    let manager = DataManager::new(quiet());
    let names = Arc::new(Mutex::new(Vec::new()));
    for event in ["store:created", "store:removed", "maintenance:optimize"] {
        let sink = names.clone();
        manager.on(event, move |e| sink.lock().push(e.name.clone()));
    }

    manager.create_store(StoreConfig::new("tmp")).await.unwrap();
    manager.optimize_all().await.unwrap();
    assert!(manager.remove_store("tmp").unwrap());

    assert_eq!(
        *names.lock(),
        vec!["store:created", "maintenance:optimize", "store:removed"]
    );
    assert_eq!(manager.stats().listener_count, 3);
}

#[tokio::test]
async fn metrics_flag_controls_store_stats() {
    let with = DataManager::new(quiet());
    with.create_store(StoreConfig::new("a")).await.unwrap();
    assert_eq!(with.stats().stores.len(), 1);

    let without = DataManager::new(ManagerConfig { enable_metrics: false, ..quiet() });
    without.create_store(StoreConfig::new("a")).await.unwrap();
    assert!(without.stats().stores.is_empty());
    assert_eq!(without.stats().store_count, 1);
}

/// Cancels maintenance from inside its own persist call.
struct CancellingBackend {
    manager: DataManager,
}

impl SyncBackend for CancellingBackend {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn persist(&self, _snapshot: &StoreSnapshot) -> Result<()> {
        self.manager.cancel_maintenance();
        Ok(())
    }
}

#[tokio::test]
async fn cancellation_mid_pass_leaves_later_stores_alone() {
    let manager = DataManager::new(quiet());
    let a = manager.create_store(StoreConfig::new("a")).await.unwrap();
    let b = manager.create_store(StoreConfig::new("b")).await.unwrap();
    let c = manager.create_store(StoreConfig::new("c")).await.unwrap();
    b.write().set_backend(Arc::new(CancellingBackend { manager: manager.clone() }));

    let report = manager.sync_all().await.unwrap();
    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.succeeded, vec!["a", "b"]);
    assert!(report.failed.is_empty());
    assert!(manager.is_maintenance_cancelled());

    assert!(a.read().last_synced().is_some());
    assert!(b.read().last_synced().is_some());
    assert!(c.read().last_synced().is_none());
    assert!(c.read().events().iter().all(|e| e.event_type != EventType::Sync));

    let later = manager.backup_all().await.unwrap();
    assert!(later.cancelled);
    assert!(later.succeeded.is_empty());
    assert_eq!(manager.backup_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn destroy_stops_in_flight_restore() {
    for trial in 0..100 {
        let manager = DataManager::new(quiet());
        let mut handles = Vec::new();
        for i in 0..40 {
            let handle = manager.create_store(StoreConfig::new(format!("s{:02}", i))).await.unwrap();
            handle.write().set("k", json!(i)).unwrap();
            handles.push(handle);
        }
        manager.backup_all().await.unwrap();

        let restoring = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.restore_all().await })
        };
        manager.destroy().await;
        let _ = restoring.await.unwrap();

        assert!(handles.iter().all(|h| h.read().is_empty()), "trial {}", trial);
        assert_eq!(manager.backup_count(), 0, "trial {}", trial);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn destroy_drops_in_flight_backups() {
    for trial in 0..100 {
        let manager = DataManager::new(quiet());
        for i in 0..40 {
            let handle = manager.create_store(StoreConfig::new(format!("s{:02}", i))).await.unwrap();
            handle.write().set("k", json!(i)).unwrap();
        }

        let backing_up = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.backup_all().await })
        };
        manager.destroy().await;
        let _ = backing_up.await.unwrap();

        assert_eq!(manager.backup_count(), 0, "trial {}", trial);
    }
}
