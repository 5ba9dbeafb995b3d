use std::time::Duration;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::StoreType;

/// Per-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: StoreType,
    pub max_size: usize,        // bytes of serialized entries, 0 = unbounded
    pub max_events: usize,      // event ring buffer capacity
    pub cache_capacity: usize,  // query result entries kept by the LRU
    pub log_reads: bool,        // append GET events on reads
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            name: "default".to_string(),
            store_type: StoreType::Memory,
            max_size: 0,
            max_events: 1000,
            cache_capacity: 256,
            log_reads: true,
        }
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        StoreConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, store_type: StoreType) -> Self {
        self.store_type = store_type;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_log_reads(mut self, log_reads: bool) -> Self {
        self.log_reads = log_reads;
        self
    }
}

/// What the scheduler does when a tick arrives while the previous run of
/// the same task is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the tick and count it as skipped.
    #[default]
    Skip,
    /// Start another run concurrently.
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    pub default_store: String,
    pub max_stores: usize,
    pub max_events: usize,
    pub enable_logging: bool,
    pub enable_metrics: bool,
    pub enable_compression: bool,
    pub enable_encryption: bool,  // accepted, not implemented by the in-memory core
    pub compression_level: i32,   // 0 = lz4, 1..=22 = zstd level
    pub encryption_key: Option<String>,

    // Maintenance intervals in milliseconds, 0 disables the task
    pub sync_interval: u64,
    pub backup_interval: u64,
    pub optimize_interval: u64,
    pub compact_interval: u64,
    pub validation_interval: u64,

    pub overlap_policy: OverlapPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            default_store: "default".to_string(),
            max_stores: 16,
            max_events: 1000,
            enable_logging: true,
            enable_metrics: true,
            enable_compression: false,
            enable_encryption: false,
            compression_level: 3,
            encryption_key: None,

            sync_interval: 30_000,        // 30s
            backup_interval: 300_000,     // 5min
            optimize_interval: 600_000,   // 10min
            compact_interval: 60_000,     // 1min
            validation_interval: 900_000, // 15min

            overlap_policy: OverlapPolicy::Skip,
        }
    }
}

impl ManagerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Config with every periodic task switched off.
    pub fn without_timers() -> Self {
        ManagerConfig {
            sync_interval: 0,
            backup_interval: 0,
            optimize_interval: 0,
            compact_interval: 0,
            validation_interval: 0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_stores == 0 {
            return Err(Error::invalid_input("maxStores must be at least 1"));
        }
        if self.default_store.trim().is_empty() {
            return Err(Error::invalid_input("defaultStore must not be empty"));
        }
        if self.enable_compression && !(0..=22).contains(&self.compression_level) {
            return Err(Error::invalid_input(format!(
                "compressionLevel {} outside 0..=22",
                self.compression_level
            )));
        }
        Ok(())
    }

    pub fn interval(ms: u64) -> Option<Duration> {
        if ms == 0 {
            None
        } else {
            Some(Duration::from_millis(ms))
        }
    }

    pub fn default_store_config(&self) -> StoreConfig {
        StoreConfig::new(self.default_store.clone()).with_max_events(self.max_events)
    }
}
