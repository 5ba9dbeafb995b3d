use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, trace};
use uuid::Uuid;
use crate::core::backend::SyncBackend;
use crate::core::config::StoreConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::event::{DataEvent, EventLog, EventType};
use crate::core::stats::StoreStats;
use crate::core::subscription::{Callback, SubscriptionOptions, SubscriptionRegistry, SubscriptionStats};
use crate::core::types::{Record, StoreType, SubscriptionId, Value};
use crate::core::utils::entry_size;
use crate::core::validation::{RecordValidator, ValidationIssue, ValidationResult};
use crate::index::data_index::{DataIndex, IndexOptions, IndexSnapshot};
use crate::query::ast::Query;
use crate::query::cache::QueryCache;
use crate::query::executor::{QueryExecutor, QueryResults};
use crate::query::planner::{QueryPlan, QueryPlanner};
use crate::query::types::StoreStatistics;

pub const STORE_FORMAT_VERSION: u32 = 1;

/// Serialized form of a store, used by export/import and backup/restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: StoreType,
    pub version: u32,
    pub last_modified: DateTime<Utc>,
    pub data: serde_json::Map<String, Value>,
    pub indexes: Vec<IndexSnapshot>,
}

/// What `optimize()` cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    pub indexes: usize,
    pub removed_buckets: usize,
}

/// Isolated key-value container with secondary indexes, a TTL result cache,
/// exact-key subscriptions and a bounded event log.
///
/// Every method finishes all of its data/index/cache/event updates before
/// returning. Subscriber callbacks run synchronously inside `set`/`delete`
/// and must not call back into the same store.
pub struct DataStore {
    id: String,
    config: StoreConfig,
    version: u32,
    enabled: bool,
    destroyed: bool,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    last_synced: Option<DateTime<Utc>>,

    data: HashMap<String, Record>,
    order: BTreeMap<u64, String>,  // insertion seq -> key
    next_seq: u64,

    cache: QueryCache,
    indexes: BTreeMap<String, DataIndex>,
    queries: BTreeMap<String, Query>,
    subscriptions: SubscriptionRegistry,
    events: EventLog<DataEvent>,

    validators: Vec<Box<dyn RecordValidator>>,
    backend: Option<Arc<dyn SyncBackend>>,
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("enabled", &self.enabled)
            .field("destroyed", &self.destroyed)
            .field("records", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl DataStore {
    pub fn new(config: StoreConfig) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        debug!(store = %config.name, id = %id, store_type = %config.store_type, "store created");

        DataStore {
            id,
            version: STORE_FORMAT_VERSION,
            enabled: true,
            destroyed: false,
            created_at: now,
            last_modified: now,
            last_synced: None,
            data: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            cache: QueryCache::new(config.cache_capacity),
            indexes: BTreeMap::new(),
            queries: BTreeMap::new(),
            subscriptions: SubscriptionRegistry::new(),
            events: EventLog::new(config.max_events),
            validators: Vec::new(),
            backend: None,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn store_type(&self) -> StoreType {
        self.config.store_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resume reads and writes. A destroyed store stays disabled.
    pub fn enable(&mut self) {
        self.enabled = !self.destroyed;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            return Err(Error::invalid_state(format!(
                "store '{}' has been destroyed",
                self.config.name
            )));
        }
        Ok(())
    }

    /// Pause the store: `set/get/delete/clear` become no-ops.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if !self.enabled {
            trace!(store = %self.config.name, key, "set dropped, store disabled");
            return Ok(());
        }

        if self.config.max_size > 0 {
            let current = self.size();
            let replaced = self.data.get(key).map(|r| entry_size(key, &r.value)).unwrap_or(0);
            let projected = current - replaced + entry_size(key, &value);
            if projected > self.config.max_size {
                return Err(Error::new(
                    ErrorKind::CapacityExceeded,
                    format!(
                        "store '{}' would grow to {} bytes (max {})",
                        self.config.name, projected, self.config.max_size
                    ),
                ));
            }
        }

        let old_value = self.data.get(key).map(|r| r.value.clone());

        for index in self.indexes.values_mut() {
            index.update(key, old_value.as_ref(), &value);
        }

        match self.data.get_mut(key) {
            Some(record) => record.value = value.clone(),
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.order.insert(seq, key.to_string());
                self.data.insert(key.to_string(), Record::new(value.clone(), seq));
            }
        }

        self.cache.clear();
        self.last_modified = Utc::now();

        let event = DataEvent::new(EventType::Set, &self.id)
            .with_key(key)
            .with_value(Some(value))
            .with_old_value(old_value);
        self.subscriptions.notify(&event);
        self.events.push(event);
        Ok(())
    }

    /// Read a value, logging a GET event when read logging is on.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        let value = self.data.get(key).map(|r| r.value.clone());
        if self.config.log_reads {
            self.events.push(
                DataEvent::new(EventType::Get, &self.id)
                    .with_key(key)
                    .with_value(value.clone()),
            );
        }
        value
    }

    /// Read without touching the event log. Ignores the enabled gate.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        self.data.get(key).map(|r| &r.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let Some(record) = self.data.remove(key) else {
            return false;
        };
        self.order.remove(&record.seq);

        for index in self.indexes.values_mut() {
            index.remove(key);
        }
        self.cache.clear();
        self.last_modified = Utc::now();

        let event = DataEvent::new(EventType::Delete, &self.id)
            .with_key(key)
            .with_value(None)
            .with_old_value(Some(record.value));
        self.subscriptions.notify(&event);
        self.events.push(event);
        true
    }

    pub fn clear(&mut self) {
        if !self.enabled {
            return;
        }

        self.data.clear();
        self.order.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
        self.cache.clear();
        self.last_modified = Utc::now();
        self.events.push(DataEvent::new(EventType::Clear, &self.id));
    }

    pub fn keys(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.order
            .values()
            .filter_map(|key| self.data.get(key).map(|r| (key, &r.value)))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialized size of all entries in bytes. Recomputed on every call.
    pub fn size(&self) -> usize {
        self.data.iter().map(|(k, r)| entry_size(k, &r.value)).sum()
    }

    pub fn export(&self) -> StoreSnapshot {
        StoreSnapshot {
            id: self.id.clone(),
            name: self.config.name.clone(),
            store_type: self.config.store_type,
            version: self.version,
            last_modified: self.last_modified,
            data: self.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            indexes: self.indexes.values().map(DataIndex::snapshot).collect(),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Replace contents with `snapshot`. Index buckets are taken verbatim
    /// from the payload, not rebuilt from its data; the caller guarantees
    /// the two agree (`validate` reports drift). The store's own id is
    /// kept. On error the store is left untouched.
    pub fn import(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        self.ensure_live()?;
        let mut indexes = BTreeMap::new();
        for index_snapshot in snapshot.indexes {
            let index = DataIndex::from_snapshot(index_snapshot)
                .map_err(|e| Error::new(ErrorKind::Serialization, e.context))?;
            if indexes.contains_key(&index.name) {
                return Err(Error::new(
                    ErrorKind::Serialization,
                    format!("duplicate index '{}' in payload", index.name),
                ));
            }
            indexes.insert(index.name.clone(), index);
        }

        self.data.clear();
        self.order.clear();
        self.next_seq = 0;
        for (key, value) in snapshot.data {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.order.insert(seq, key.clone());
            self.data.insert(key, Record::new(value, seq));
        }

        self.indexes = indexes;
        self.version = snapshot.version;
        self.cache.clear();
        self.last_modified = Utc::now();

        debug!(
            store = %self.config.name,
            records = self.data.len(),
            indexes = self.indexes.len(),
            "store imported"
        );
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        self.import(snapshot)
    }

    pub fn backup(&mut self) -> StoreSnapshot {
        let snapshot = self.export();
        if !self.destroyed {
            self.events.push(DataEvent::new(EventType::Backup, &self.id));
        }
        snapshot
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        self.import(snapshot)?;
        self.events.push(DataEvent::new(EventType::Restore, &self.id));
        Ok(())
    }

    /// Push the current contents to the attached backend, if any.
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_live()?;
        if let Some(backend) = &self.backend {
            backend.persist(&self.export()).map_err(|e| {
                Error::new(
                    ErrorKind::Backend,
                    format!("backend '{}' failed: {}", backend.name(), e.context),
                )
            })?;
        }
        self.last_synced = Some(Utc::now());
        self.events.push(DataEvent::new(EventType::Sync, &self.id));
        Ok(())
    }

    pub fn set_backend(&mut self, backend: Arc<dyn SyncBackend>) {
        self.backend = Some(backend);
    }

    pub fn query(&mut self, query: &Query) -> QueryResults {
        let cache_key = match query.cache {
            Some(policy) if policy.is_active() => Some((query.canonical_key(), policy.ttl)),
            _ => None,
        };

        if let Some((key, _)) = &cache_key {
            if let Some(cached) = self.cache.get(key, Utc::now()) {
                if let Ok(mut results) = serde_json::from_value::<QueryResults>(cached) {
                    results.from_cache = true;
                    return results;
                }
            }
        }

        let results = QueryExecutor::execute(query, self.iter());

        if let Some((key, ttl)) = cache_key {
            if let Ok(snapshot) = serde_json::to_value(&results) {
                self.cache.put(key, snapshot, ttl, Utc::now());
            }
        }
        results
    }

    pub fn explain(&self, query: &Query) -> QueryPlan {
        let statistics = StoreStatistics {
            total_records: self.data.len(),
            index_count: self.indexes.len(),
        };
        QueryPlanner::new(statistics).explain(query, &self.indexes)
    }

    pub fn define_query(&mut self, name: &str, query: Query) {
        self.queries.insert(name.to_string(), query);
    }

    pub fn run_query(&mut self, name: &str) -> Option<QueryResults> {
        let query = self.queries.get(name)?.clone();
        Some(self.query(&query))
    }

    pub fn remove_query(&mut self, name: &str) -> bool {
        self.queries.remove(name).is_some()
    }

    pub fn query_names(&self) -> Vec<String> {
        self.queries.keys().cloned().collect()
    }

    pub fn subscribe<F>(&mut self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&DataEvent) + Send + Sync + 'static,
    {
        self.subscribe_with(key, callback, SubscriptionOptions::default())
    }

    pub fn subscribe_with<F>(&mut self, key: &str, callback: F, options: SubscriptionOptions) -> SubscriptionId
    where
        F: Fn(&DataEvent) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.subscriptions.subscribe(key, callback, options)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    pub fn subscription_stats(&self) -> Vec<SubscriptionStats> {
        self.subscriptions.stats()
    }

    pub fn create_index(&mut self, name: &str, fields: &[&str], options: IndexOptions) -> Result<()> {
        self.ensure_live()?;
        if self.indexes.contains_key(name) {
            return Err(Error::invalid_input(format!(
                "index '{}' already exists on store '{}'",
                name, self.config.name
            )));
        }

        let mut index = DataIndex::new(name, fields.iter().map(|f| f.to_string()).collect(), options)?;
        for (key, value) in self.iter() {
            index.add(key, value);
        }

        debug!(
            store = %self.config.name,
            index = name,
            buckets = index.bucket_count(),
            "index created"
        );
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub fn remove_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    pub fn get_index(&self, name: &str) -> Option<&DataIndex> {
        self.indexes.get(name)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn optimize(&mut self) -> OptimizeReport {
        if self.destroyed {
            return OptimizeReport::default();
        }
        let removed_buckets = self.indexes.values_mut().map(DataIndex::optimize).sum();
        self.events.push(DataEvent::new(EventType::Optimize, &self.id));
        OptimizeReport { indexes: self.indexes.len(), removed_buckets }
    }

    /// Evict expired result-cache entries. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        self.compact_at(Utc::now())
    }

    pub fn compact_at(&mut self, now: DateTime<Utc>) -> usize {
        if self.destroyed {
            return 0;
        }
        let evicted = self.cache.evict_expired(now);
        self.events.push(DataEvent::new(EventType::Compact, &self.id));
        evicted
    }

    pub fn add_validator(&mut self, validator: Box<dyn RecordValidator>) {
        self.validators.push(validator);
    }

    /// Inspect every record. Never fails: problems are collected into the
    /// result.
    pub fn validate(&self) -> ValidationResult {
        let start = Instant::now();
        let mut result = ValidationResult::new();

        for (key, value) in self.iter() {
            result.checked += 1;

            if value.is_null() {
                result.push(ValidationIssue::warning(Some(key.as_str()), "value is null"));
            }

            for validator in &self.validators {
                let outcome = catch_unwind(AssertUnwindSafe(|| validator.validate(key, value)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(message)) => result.push(ValidationIssue::error(
                        Some(key.as_str()),
                        format!("{}: {}", validator.name(), message),
                    )),
                    Err(_) => result.push(ValidationIssue::error(
                        Some(key.as_str()),
                        format!("{}: validator panicked", validator.name()),
                    )),
                }
            }
        }

        self.check_indexes(&mut result);

        if self.config.max_size > 0 {
            let size = self.size();
            if size > self.config.max_size {
                result.push(ValidationIssue::warning(
                    None,
                    format!("store size {} exceeds max {}", size, self.config.max_size),
                ));
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Index drift: buckets that disagree with the records they point at,
    /// or records missing from an index that should hold them.
    fn check_indexes(&self, result: &mut ValidationResult) {
        for index in self.indexes.values() {
            for (composite, keys) in index.buckets() {
                for key in keys {
                    let expected = self.data.get(key).and_then(|r| index.composite_key(&r.value));
                    if expected.as_deref() != Some(composite.as_str()) {
                        result.push(
                            ValidationIssue::error(
                                Some(key.as_str()),
                                format!("index '{}' bucket '{}' is stale", index.name, composite),
                            )
                            .on_field(&index.fields.join(",")),
                        );
                    }
                }
            }

            for (key, record) in &self.data {
                if let Some(composite) = index.composite_key(&record.value) {
                    if !index.contains(&composite, key) {
                        result.push(ValidationIssue::error(
                            Some(key.as_str()),
                            format!("record missing from index '{}'", index.name),
                        ));
                    }
                }
            }
        }
    }

    pub fn events(&self) -> Vec<DataEvent> {
        self.events.to_vec()
    }

    pub fn recent_events(&self, n: usize) -> Vec<DataEvent> {
        self.events.recent(n)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            id: self.id.clone(),
            name: self.config.name.clone(),
            store_type: self.config.store_type,
            version: self.version,
            enabled: self.enabled,
            created_at: self.created_at,
            last_modified: self.last_modified,
            last_synced: self.last_synced,
            records: self.data.len(),
            size_bytes: self.size(),
            max_size: self.config.max_size,
            cache: self.cache.stats(),
            indexes: self.indexes.values().map(DataIndex::stats).collect(),
            index_count: self.indexes.len(),
            query_count: self.queries.len(),
            subscription_count: self.subscriptions.len(),
            event_count: self.events.len(),
            events_dropped: self.events.dropped(),
        }
    }

    /// Tear down: every internal map is emptied.
    pub fn destroy(&mut self) {
        self.data.clear();
        self.order.clear();
        self.cache.clear();
        self.indexes.clear();
        self.queries.clear();
        self.subscriptions.clear();
        self.events.clear();
        self.validators.clear();
        self.backend = None;
        self.enabled = false;
        self.destroyed = true;
        debug!(store = %self.config.name, "store destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::MemoryBackend;
    use crate::core::validation::FnValidator;
    use crate::query::ast::Operator;
    use chrono::Duration;
    use parking_lot::Mutex;
    use serde_json::json;

    fn store() -> DataStore {
        DataStore::new(StoreConfig::new("test"))
    }

    fn count(store: &DataStore, kind: EventType) -> usize {
        store.events().iter().filter(|e| e.event_type == kind).count()
    }

    #[test]
    fn set_then_get() {
        let mut s = store();
        s.set("score:alice", json!(120)).unwrap();
        assert_eq!(s.get("score:alice"), Some(json!(120)));
        assert_eq!(s.get("score:bob"), None);
        assert_eq!(count(&s, EventType::Get), 2);
    }

    #[test]
    fn set_records_old_value() {
        let mut s = store();
        s.set("k", json!(1)).unwrap();
        s.set("k", json!(2)).unwrap();
        let last = s.recent_events(1).pop().unwrap();
        assert_eq!(last.old_value, Some(json!(1)));
        assert_eq!(last.value, Some(json!(2)));
        assert_eq!(last.source, s.id());
    }

    #[test]
    fn delete_missing_returns_false_without_event() {
        let mut s = store();
        assert!(!s.delete("missing"));
        assert_eq!(count(&s, EventType::Delete), 0);

        s.set("k", json!(1)).unwrap();
        assert!(s.delete("k"));
        assert_eq!(count(&s, EventType::Delete), 1);
    }

    #[test]
    fn upsert_keeps_insertion_position() {
        let mut s = store();
        s.set("a", json!(1)).unwrap();
        s.set("b", json!(2)).unwrap();
        s.set("a", json!(3)).unwrap();
        assert_eq!(s.keys(), vec!["a", "b"]);
        assert_eq!(s.values(), vec![json!(3), json!(2)]);
    }

    #[test]
    fn clear_wipes_data_and_indexes() {
        let mut s = store();
        s.create_index("by_rank", &["rank"], IndexOptions::default()).unwrap();
        s.set("p1", json!({"rank": "gold"})).unwrap();
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.get_index("by_rank").unwrap().entry_count(), 0);
        assert_eq!(count(&s, EventType::Clear), 1);
    }

    #[test]
    fn disabled_store_drops_operations() {
        let mut s = store();
        s.set("k", json!(1)).unwrap();
        s.disable();

        s.set("k", json!(2)).unwrap();
        assert_eq!(s.get("k"), None);
        assert!(!s.delete("k"));
        s.clear();

        s.enable();
        assert_eq!(s.get("k"), Some(json!(1)));
    }

    #[test]
    fn read_logging_can_be_disabled() {
        let mut s = DataStore::new(StoreConfig::new("quiet").with_log_reads(false));
        s.set("k", json!(1)).unwrap();
        s.get("k");
        assert_eq!(count(&s, EventType::Get), 0);
    }

    #[test]
    fn event_log_is_bounded() {
        let mut s = DataStore::new(StoreConfig::new("small").with_max_events(5));
        for i in 0..20 {
            s.set(&format!("k{}", i), json!(i)).unwrap();
        }
        assert_eq!(s.events().len(), 5);
        assert_eq!(s.stats().events_dropped, 15);
    }

    #[test]
    fn max_size_rejects_oversized_writes() {
        let mut s = DataStore::new(StoreConfig::new("tiny").with_max_size(20));
        s.set("a", json!("12345")).unwrap();
        let err = s.set("b", json!("x".repeat(50))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert!(!s.contains_key("b"));
    }

    #[test]
    fn size_sums_serialized_entries() {
        let mut s = store();
        s.set("ab", json!({"x": 1})).unwrap();
        // "\"ab\"" (4) + {"x":1} (7)
        assert_eq!(s.size(), 11);
    }

    #[test]
    fn index_tracks_updates_and_deletes() {
        let mut s = store();
        s.set("p1", json!({"id": 1, "rank": "gold"})).unwrap();
        s.create_index("by_rank", &["rank"], IndexOptions::default()).unwrap();
        s.set("p2", json!({"id": 2, "rank": "gold"})).unwrap();
        s.set("p1", json!({"id": 1, "rank": "silver"})).unwrap();

        let index = s.get_index("by_rank").unwrap();
        assert_eq!(index.find(&json!("gold")).into_iter().collect::<Vec<_>>(), vec!["p2"]);
        assert_eq!(index.find(&json!("silver")).len(), 1);

        s.delete("p2");
        assert!(s.get_index("by_rank").unwrap().find(&json!("gold")).is_empty());

        let report = s.optimize();
        assert_eq!(report.removed_buckets, 1);
        assert!(s.create_index("by_rank", &["rank"], IndexOptions::default()).is_err());
        assert!(s.remove_index("by_rank"));
    }

    #[test]
    fn subscribers_see_set_and_delete() {
        let mut s = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = s.subscribe("lives", move |e| sink.lock().push((e.event_type, e.value.clone())));

        s.set("lives", json!(3)).unwrap();
        s.set("other", json!(1)).unwrap();
        s.delete("lives");
        assert!(s.unsubscribe(id));
        s.set("lives", json!(4)).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![(EventType::Set, Some(json!(3))), (EventType::Delete, None)]
        );
    }

    #[test]
    fn once_subscription_fires_once() {
        let mut s = store();
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        s.subscribe_with("lives", move |_| *c.lock() += 1, SubscriptionOptions::once());
        s.set("lives", json!(3)).unwrap();
        s.set("lives", json!(3)).unwrap();
        assert_eq!(*calls.lock(), 1);
        assert!(s.subscription_stats().is_empty());
    }

    #[test]
    fn cached_query_hits_until_mutation() {
        let mut s = store();
        s.set("p1", json!({"rank": "gold"})).unwrap();
        let q = Query::new().filter("rank", Operator::Eq, json!("gold")).cached(60_000);

        assert!(!s.query(&q).from_cache);
        let second = s.query(&q);
        assert!(second.from_cache);
        assert_eq!(second.keys(), vec!["p1"]);

        s.set("p2", json!({"rank": "gold"})).unwrap();
        let third = s.query(&q);
        assert!(!third.from_cache);
        assert_eq!(third.len(), 2);
        assert_eq!(s.stats().cache.hit_count, 1);
    }

    #[test]
    fn zero_ttl_query_is_not_cached() {
        let mut s = store();
        let q = Query::new().cached(0);
        s.query(&q);
        assert!(!s.query(&q).from_cache);
        assert_eq!(s.stats().cache.size, 0);
    }

    #[test]
    fn compact_evicts_expired_results() {
        let mut s = store();
        s.set("p1", json!({"rank": "gold"})).unwrap();
        s.query(&Query::new().cached(100));
        s.query(&Query::new().limit(1).cached(60_000));

        let later = Utc::now() + Duration::milliseconds(150);
        assert_eq!(s.compact_at(later), 1);
        assert_eq!(s.stats().cache.size, 1);
        assert_eq!(count(&s, EventType::Compact), 1);
    }

    #[test]
    fn named_queries() {
        let mut s = store();
        s.set("p1", json!({"rank": "gold"})).unwrap();
        s.define_query("golds", Query::new().filter("rank", Operator::Eq, json!("gold")));
        assert_eq!(s.run_query("golds").unwrap().len(), 1);
        assert!(s.run_query("nope").is_none());
        assert!(s.remove_query("golds"));
    }

    #[test]
    fn export_import_round_trip() {
        let mut s = store();
        s.create_index("by_rank", &["rank"], IndexOptions::default()).unwrap();
        s.set("p1", json!({"id": 1, "rank": "gold"})).unwrap();
        s.set("p2", json!({"id": 2, "rank": "silver"})).unwrap();

        let json = s.export_json().unwrap();
        let mut fresh = DataStore::new(StoreConfig::new("fresh"));
        fresh.import_json(&json).unwrap();

        assert_eq!(fresh.entries(), s.entries());
        assert_eq!(
            fresh.get_index("by_rank").unwrap().find(&json!("gold")),
            s.get_index("by_rank").unwrap().find(&json!("gold"))
        );
    }

    #[test]
    fn malformed_import_leaves_store_untouched() {
        let mut s = store();
        s.set("k", json!(1)).unwrap();
        let err = s.import_json("{\"data\": 5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert_eq!(s.peek("k"), Some(&json!(1)));
    }

    #[test]
    fn inconsistent_import_is_reported_by_validate() {
        let mut s = store();
        s.create_index("by_rank", &["rank"], IndexOptions::default()).unwrap();
        s.set("p1", json!({"rank": "gold"})).unwrap();

        let mut snapshot = s.export();
        snapshot.indexes[0].data.insert("gold".into(), vec!["ghost".into()]);
        s.import(snapshot).unwrap();

        let result = s.validate();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.key.as_deref() == Some("ghost")));
    }

    #[test]
    fn validate_collects_warnings_and_errors() {
        let mut s = store();
        s.set("empty", Value::Null).unwrap();
        s.set("neg", json!(-5)).unwrap();
        s.set("boom", json!("panic")).unwrap();
        s.add_validator(Box::new(FnValidator::new("rules", |_, v: &Value| {
            if v == &json!("panic") {
                panic!("inspection blew up");
            }
            match v.as_i64() {
                Some(n) if n < 0 => Err("negative".to_string()),
                _ => Ok(()),
            }
        })));

        let result = s.validate();
        assert_eq!(result.checked, 3);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(result.error_count(), 2);
    }

    #[test]
    fn sync_pushes_to_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let mut s = store();
        s.set_backend(backend.clone());
        s.set("k", json!(1)).unwrap();
        s.sync().unwrap();

        assert_eq!(backend.latest(s.id()).unwrap().data.len(), 1);
        assert!(s.last_synced().is_some());
        assert_eq!(count(&s, EventType::Sync), 1);
    }

    #[test]
    fn backup_restore_emit_events() {
        let mut s = store();
        s.set("k", json!(1)).unwrap();
        let snapshot = s.backup();
        s.set("k", json!(2)).unwrap();
        s.restore(snapshot).unwrap();
        assert_eq!(s.peek("k"), Some(&json!(1)));
        assert_eq!(count(&s, EventType::Backup), 1);
        assert_eq!(count(&s, EventType::Restore), 1);
    }

    #[test]
    fn destroy_clears_everything() {
        let mut s = store();
        s.set("k", json!(1)).unwrap();
        s.subscribe("k", |_| {});
        s.destroy();
        let stats = s.stats();
        assert_eq!((stats.records, stats.subscription_count, stats.event_count), (0, 0, 0));
        assert!(!s.is_enabled());
    }

    #[test]
    fn destroyed_store_cannot_be_refilled() {
        let mut s = store();
        s.set("k", json!(1)).unwrap();
        let snapshot = s.backup();
        s.set_backend(Arc::new(MemoryBackend::new()));
        s.destroy();

        let err = s.restore(snapshot.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(s.import(snapshot).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(s.sync().unwrap_err().kind(), ErrorKind::InvalidState);
        assert!(s.create_index("by_k", &["k"], IndexOptions::default()).is_err());

        s.enable();
        s.set("k", json!(2)).unwrap();
        assert_eq!(s.optimize(), OptimizeReport::default());
        assert_eq!(s.compact(), 0);
        assert!(s.is_empty());
        assert!(s.is_destroyed());
        assert_eq!(s.stats().event_count, 0);
    }
}
