use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::core::types::StoreType;
use crate::index::data_index::IndexStats;
use crate::maintenance::scheduler::TaskStats;
use crate::query::cache::CacheStats;

/// Store statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    // General info
    pub id: String,
    pub name: String,
    pub store_type: StoreType,
    pub version: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_synced: Option<DateTime<Utc>>,

    // Data metrics
    pub records: usize,
    pub size_bytes: usize,
    pub max_size: usize,

    // Cache metrics
    pub cache: CacheStats,

    // Structure counts
    pub indexes: Vec<IndexStats>,
    pub index_count: usize,
    pub query_count: usize,
    pub subscription_count: usize,
    pub event_count: usize,
    pub events_dropped: u64,
}

impl StoreStats {
    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }
}

/// Manager-wide snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub store_count: usize,
    pub max_stores: usize,
    pub default_store: Option<String>,
    pub listener_count: usize,
    pub event_count: usize,
    pub events_dropped: u64,
    pub backups: usize,
    pub destroyed: bool,
    pub tasks: Vec<TaskStats>,
    pub stores: Vec<StoreStats>,  // empty unless metrics are enabled
}

/// Health check status
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}
