use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::compression::compress::{BackupCodec, CompressionType};
use crate::core::config::{ManagerConfig, StoreConfig};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::event::{EventLog, ManagerEvent};
use crate::core::stats::{HealthStatus, ManagerStats};
use crate::core::store::{DataStore, StoreSnapshot};
use crate::core::types::{ListenerId, Value};
use crate::core::validation::ValidationResult;
use crate::maintenance::scheduler::{JobFn, JobFuture, MaintenanceScheduler, MaintenanceTask};

/// Shared handle to a managed store. Never hold the guard across `.await`.
pub type StoreHandle = Arc<RwLock<DataStore>>;

pub type Listener = Arc<dyn Fn(&ManagerEvent) + Send + Sync>;

/// One store that a bulk operation could not handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub store: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a bulk operation. Per-store failures never abort the run.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub operation: &'static str,
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
    pub skipped: Vec<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validations: BTreeMap<String, ValidationResult>,
}

impl BulkReport {
    fn new(operation: &'static str) -> Self {
        BulkReport {
            operation,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
            duration_ms: 0,
            validations: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Stores whose validation reported errors.
    pub fn invalid_stores(&self) -> Vec<&str> {
        self.validations
            .iter()
            .filter(|(_, r)| !r.valid)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// What a per-store step did.
enum Step {
    Done,
    Skipped,
    /// Teardown reached the store first; the pass stops here.
    Cancelled,
}

struct ListenerEntry {
    id: ListenerId,
    name: String,
    callback: Listener,
}

struct ManagerInner {
    config: ManagerConfig,
    codec: BackupCodec,
    stores: RwLock<BTreeMap<String, StoreHandle>>,
    default_store: RwLock<Option<String>>,
    backups: RwLock<HashMap<String, Vec<u8>>>,
    listeners: RwLock<Vec<ListenerEntry>>,
    next_listener: AtomicU64,
    events: Mutex<EventLog<ManagerEvent>>,
    scheduler: Mutex<Option<MaintenanceScheduler>>,
    cancel: CancellationToken,
    initialized: AtomicBool,
    destroyed: AtomicBool,
}

/// Registry of named stores plus the periodic maintenance around them.
///
/// Cheap to clone; every clone drives the same stores.
#[derive(Clone)]
pub struct DataManager {
    inner: Arc<ManagerInner>,
}

impl DataManager {
    pub fn new(config: ManagerConfig) -> Self {
        let compression = CompressionType::from_settings(config.enable_compression, config.compression_level);
        let events = EventLog::new(config.max_events);

        DataManager {
            inner: Arc::new(ManagerInner {
                codec: BackupCodec::new(compression),
                stores: RwLock::new(BTreeMap::new()),
                default_store: RwLock::new(None),
                backups: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                events: Mutex::new(events),
                scheduler: Mutex::new(None),
                cancel: CancellationToken::new(),
                initialized: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Validate the config, create the default store and start the
    /// maintenance timers. Calling it again is a no-op.
    pub async fn init(&self) -> Result<()> {
        self.ensure_alive()?;
        let config = &self.inner.config;
        config.validate()?;

        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if config.enable_encryption {
            warn!("encryption requested but not supported by the in-memory core; data is stored in clear");
        }

        if !self.inner.stores.read().contains_key(&config.default_store) {
            if let Err(e) = self.create_store(config.default_store_config()).await {
                self.inner.initialized.store(false, Ordering::Release);
                return Err(e);
            }
        }
        *self.inner.default_store.write() = Some(config.default_store.clone());

        let schedule: Vec<_> = MaintenanceTask::ALL
            .iter()
            .filter_map(|&task| {
                ManagerConfig::interval(self.interval_ms(task)).map(|period| (task, period))
            })
            .collect();

        let scheduler = MaintenanceScheduler::start(
            &schedule,
            config.overlap_policy,
            self.inner.cancel.clone(),
            Self::job(Arc::downgrade(&self.inner)),
        );
        *self.inner.scheduler.lock() = Some(scheduler);

        if config.enable_logging {
            info!(
                default_store = %config.default_store,
                timers = schedule.len(),
                "data manager initialized"
            );
        }
        Ok(())
    }

    fn interval_ms(&self, task: MaintenanceTask) -> u64 {
        let config = &self.inner.config;
        match task {
            MaintenanceTask::Sync => config.sync_interval,
            MaintenanceTask::Backup => config.backup_interval,
            MaintenanceTask::Optimize => config.optimize_interval,
            MaintenanceTask::Compact => config.compact_interval,
            MaintenanceTask::Validate => config.validation_interval,
        }
    }

    /// Scheduler job. Holds the manager weakly so timers never keep it alive.
    fn job(inner: Weak<ManagerInner>) -> JobFn {
        Arc::new(move |task: MaintenanceTask| -> JobFuture {
            let inner = inner.clone();
            Box::pin(async move {
                let Some(inner) = inner.upgrade() else {
                    return Ok(());
                };
                let manager = DataManager { inner };
                let report = manager.run_task(task).await?;

                match report.failed.first() {
                    None => Ok(()),
                    Some(first) => Err(Error::new(
                        first.kind,
                        format!(
                            "{} of {} stores failed during {}: {}",
                            report.failed.len(),
                            report.failed.len() + report.succeeded.len(),
                            task,
                            first.message
                        ),
                    )),
                }
            })
        })
    }

    /// Stop maintenance without tearing stores down. Timer loops exit and a
    /// running bulk pass stops before its next store; later passes report
    /// `cancelled` straight away. There is no way to resume.
    pub fn cancel_maintenance(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_maintenance_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::invalid_state("data manager has been destroyed"));
        }
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub async fn create_store(&self, config: StoreConfig) -> Result<StoreHandle> {
        self.ensure_alive()?;

        if !config.store_type.is_supported() {
            return Err(Error::new(
                ErrorKind::UnsupportedStoreType,
                format!("store type '{}' is not available in the in-memory core", config.store_type),
            ));
        }
        if config.name.trim().is_empty() {
            return Err(Error::invalid_input("store name must not be empty"));
        }

        let name = config.name.clone();
        let store_type = config.store_type;
        let handle = {
            let mut stores = self.inner.stores.write();
            if stores.contains_key(&name) {
                return Err(Error::new(
                    ErrorKind::DuplicateStore,
                    format!("store '{}' already exists", name),
                ));
            }
            if stores.len() >= self.inner.config.max_stores {
                return Err(Error::new(
                    ErrorKind::CapacityExceeded,
                    format!("store limit of {} reached", self.inner.config.max_stores),
                ));
            }

            let handle: StoreHandle = Arc::new(RwLock::new(DataStore::new(config)));
            stores.insert(name.clone(), handle.clone());
            handle
        };

        debug!(store = %name, "store registered");
        self.publish("store:created", Some(name.as_str()), json!({ "type": store_type }));
        Ok(handle)
    }

    pub fn get_store(&self, name: &str) -> Option<StoreHandle> {
        self.inner.stores.read().get(name).cloned()
    }

    pub fn default_store(&self) -> Option<StoreHandle> {
        let name = self.inner.default_store.read().clone()?;
        self.get_store(&name)
    }

    pub fn default_store_name(&self) -> Option<String> {
        self.inner.default_store.read().clone()
    }

    pub fn set_default_store(&self, name: &str) -> Result<()> {
        self.ensure_alive()?;
        if !self.inner.stores.read().contains_key(name) {
            return Err(Error::new(ErrorKind::NotFound, format!("store '{}' not found", name)));
        }
        *self.inner.default_store.write() = Some(name.to_string());
        Ok(())
    }

    /// Destroy and unregister a store. Returns false if it did not exist.
    pub fn remove_store(&self, name: &str) -> Result<bool> {
        self.ensure_alive()?;

        let Some(handle) = self.inner.stores.write().remove(name) else {
            return Ok(false);
        };
        handle.write().destroy();
        self.inner.backups.write().remove(name);

        {
            let mut default = self.inner.default_store.write();
            if default.as_deref() == Some(name) {
                *default = None;
            }
        }

        debug!(store = %name, "store removed");
        self.publish("store:removed", Some(name), Value::Null);
        Ok(true)
    }

    /// Registered store names, sorted.
    pub fn store_names(&self) -> Vec<String> {
        self.inner.stores.read().keys().cloned().collect()
    }

    pub fn store_count(&self) -> usize {
        self.inner.stores.read().len()
    }

    pub async fn run_task(&self, task: MaintenanceTask) -> Result<BulkReport> {
        match task {
            MaintenanceTask::Sync => self.sync_all().await,
            MaintenanceTask::Backup => self.backup_all().await,
            MaintenanceTask::Optimize => self.optimize_all().await,
            MaintenanceTask::Compact => self.compact_all().await,
            MaintenanceTask::Validate => self.validate_all().await,
        }
    }

    pub async fn sync_all(&self) -> Result<BulkReport> {
        self.run_bulk(MaintenanceTask::Sync.name(), |_, handle, _| {
            let mut store = handle.write();
            if store.is_destroyed() {
                return Ok(Step::Cancelled);
            }
            store.sync()?;
            Ok(Step::Done)
        })
        .await
    }

    /// Encode every store's snapshot and keep it as that store's latest
    /// backup.
    pub async fn backup_all(&self) -> Result<BulkReport> {
        let inner = self.inner.clone();
        self.run_bulk(MaintenanceTask::Backup.name(), move |name, handle, _| {
            let snapshot = {
                let mut store = handle.write();
                if store.is_destroyed() {
                    return Ok(Step::Cancelled);
                }
                store.backup()
            };
            let bytes = inner.codec.encode(&snapshot)?;

            // destroy() raises the flag before it clears backups
            let mut backups = inner.backups.write();
            if inner.destroyed.load(Ordering::Acquire) {
                return Ok(Step::Cancelled);
            }
            backups.insert(name.to_string(), bytes);
            Ok(Step::Done)
        })
        .await
    }

    /// Restore every store that has a backup. Stores without one are
    /// reported as skipped.
    pub async fn restore_all(&self) -> Result<BulkReport> {
        let inner = self.inner.clone();
        self.run_bulk("restore", move |name, handle, _| {
            let Some(bytes) = inner.backups.read().get(name).cloned() else {
                return Ok(Step::Skipped);
            };
            let snapshot: StoreSnapshot = inner.codec.decode(&bytes)?;
            let mut store = handle.write();
            if store.is_destroyed() {
                return Ok(Step::Cancelled);
            }
            store.restore(snapshot)?;
            Ok(Step::Done)
        })
        .await
    }

    pub async fn optimize_all(&self) -> Result<BulkReport> {
        self.run_bulk(MaintenanceTask::Optimize.name(), |_, handle, _| {
            let mut store = handle.write();
            if store.is_destroyed() {
                return Ok(Step::Cancelled);
            }
            store.optimize();
            Ok(Step::Done)
        })
        .await
    }

    pub async fn compact_all(&self) -> Result<BulkReport> {
        self.run_bulk(MaintenanceTask::Compact.name(), |_, handle, _| {
            let mut store = handle.write();
            if store.is_destroyed() {
                return Ok(Step::Cancelled);
            }
            store.compact();
            Ok(Step::Done)
        })
        .await
    }

    /// Validate every store. Per-store results land in
    /// `BulkReport::validations`; an invalid store is still a successful
    /// run.
    pub async fn validate_all(&self) -> Result<BulkReport> {
        self.run_bulk(MaintenanceTask::Validate.name(), |name, handle, report| {
            let store = handle.read();
            if store.is_destroyed() {
                return Ok(Step::Cancelled);
            }
            let result = store.validate();
            report.validations.insert(name.to_string(), result);
            Ok(Step::Done)
        })
        .await
    }

    /// Shared fail-soft loop. The store list is snapshotted up front; the
    /// cancel token is checked before each store, and each step re-checks
    /// the store's destroyed flag under the guard it mutates through.
    /// Stores after the cancellation point are left untouched.
    async fn run_bulk<F>(&self, operation: &'static str, mut step: F) -> Result<BulkReport>
    where
        F: FnMut(&str, &StoreHandle, &mut BulkReport) -> Result<Step>,
    {
        self.ensure_alive()?;
        let start = Instant::now();
        let mut report = BulkReport::new(operation);

        let stores: Vec<(String, StoreHandle)> = self
            .inner
            .stores
            .read()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        for (name, handle) in &stores {
            if self.inner.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match step(name, handle, &mut report) {
                Ok(Step::Done) => report.succeeded.push(name.clone()),
                Ok(Step::Skipped) => report.skipped.push(name.clone()),
                Ok(Step::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(operation, store = %name, error = %e, "bulk operation failed for store");
                    report.failed.push(BulkFailure {
                        store: name.clone(),
                        kind: e.kind(),
                        message: e.context,
                    });
                }
            }

            tokio::task::yield_now().await;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        if self.inner.config.enable_logging {
            info!(
                operation,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                cancelled = report.cancelled,
                duration_ms = report.duration_ms,
                "bulk operation finished"
            );
        }

        self.publish(
            &format!("maintenance:{}", operation),
            None,
            json!({
                "succeeded": report.succeeded.len(),
                "failed": report.failed.len(),
                "skipped": report.skipped.len(),
                "cancelled": report.cancelled,
            }),
        );
        if !report.failed.is_empty() {
            self.publish(
                "maintenance:failed",
                None,
                json!({ "operation": operation, "failures": report.failed }),
            );
        }

        Ok(report)
    }

    /// Latest encoded backup of `name`, if one was taken.
    pub fn backup_of(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.backups.read().get(name).cloned()
    }

    pub fn backup_count(&self) -> usize {
        self.inner.backups.read().len()
    }

    /// Restore one store from an encoded backup frame.
    pub fn restore_store(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_alive()?;
        let handle = self
            .get_store(name)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("store '{}' not found", name)))?;

        let snapshot: StoreSnapshot = self.inner.codec.decode(bytes)?;
        handle.write().restore(snapshot)
    }

    /// Register a listener for events named exactly `name`.
    pub fn on<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push(ListenerEntry {
            id,
            name: name.to_string(),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Record the event and deliver it to matching listeners in
    /// registration order. Returns the number of listeners called.
    pub fn emit(&self, name: &str, payload: Value) -> usize {
        self.publish(name, None, payload)
    }

    fn publish(&self, name: &str, store: Option<&str>, payload: Value) -> usize {
        if self.is_destroyed() {
            return 0;
        }

        let event = ManagerEvent::new(name, store, payload);
        self.inner.events.lock().push(event.clone());

        let callbacks: Vec<Listener> = self
            .inner
            .listeners
            .read()
            .iter()
            .filter(|l| l.name == name)
            .map(|l| l.callback.clone())
            .collect();

        for callback in &callbacks {
            callback(&event);
        }
        callbacks.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub fn events(&self) -> Vec<ManagerEvent> {
        self.inner.events.lock().to_vec()
    }

    pub fn stats(&self) -> ManagerStats {
        let tasks = self
            .inner
            .scheduler
            .lock()
            .as_ref()
            .map(MaintenanceScheduler::stats)
            .unwrap_or_default();

        let stores = if self.inner.config.enable_metrics {
            self.inner
                .stores
                .read()
                .values()
                .map(|handle| handle.read().stats())
                .collect()
        } else {
            Vec::new()
        };

        let (event_count, events_dropped) = {
            let events = self.inner.events.lock();
            (events.len(), events.dropped())
        };

        ManagerStats {
            store_count: self.store_count(),
            max_stores: self.inner.config.max_stores,
            default_store: self.default_store_name(),
            listener_count: self.listener_count(),
            event_count,
            events_dropped,
            backups: self.backup_count(),
            destroyed: self.is_destroyed(),
            tasks,
            stores,
        }
    }

    pub fn health(&self) -> HealthStatus {
        if self.is_destroyed() {
            return HealthStatus::Unhealthy("data manager destroyed".to_string());
        }

        let failing: Vec<String> = self
            .stats()
            .tasks
            .iter()
            .filter(|t| t.last_error.is_some())
            .map(|t| t.task.to_string())
            .collect();

        if failing.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(format!("failing maintenance: {}", failing.join(", ")))
        }
    }

    /// Stop every timer, destroy every store and drop all listeners and
    /// backups. Safe to call more than once.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();

        let scheduler = self.inner.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }

        let stores: Vec<StoreHandle> = {
            let mut stores = self.inner.stores.write();
            let drained = stores.values().cloned().collect();
            stores.clear();
            drained
        };
        for handle in &stores {
            handle.write().destroy();
        }

        *self.inner.default_store.write() = None;
        self.inner.backups.write().clear();
        self.inner.listeners.write().clear();
        self.inner.events.lock().clear();

        if self.inner.config.enable_logging {
            info!(stores = stores.len(), "data manager destroyed");
        }
    }
}
