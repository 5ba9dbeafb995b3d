use std::collections::HashMap;
use parking_lot::Mutex;
use crate::core::error::Result;
use crate::core::store::StoreSnapshot;

/// Durable target for `DataStore::sync`. The in-memory core ships without
/// one; attach an implementation to persist snapshots elsewhere.
pub trait SyncBackend: Send + Sync {
    fn name(&self) -> &str;
    fn persist(&self, snapshot: &StoreSnapshot) -> Result<()>;
}

/// Keeps the latest snapshot per store id in memory.
#[derive(Default)]
pub struct MemoryBackend {
    snapshots: Mutex<HashMap<String, StoreSnapshot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, store_id: &str) -> Option<StoreSnapshot> {
        self.snapshots.lock().get(store_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl SyncBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }
}
