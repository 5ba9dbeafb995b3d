use std::collections::VecDeque;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::core::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Set,
    Get,
    Delete,
    Clear,
    Sync,
    Backup,
    Restore,
    Optimize,
    Compact,
}

/// One entry of a store's event log, also the payload handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub key: Option<String>,
    pub value: Option<Value>,
    pub old_value: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl DataEvent {
    pub fn new(event_type: EventType, source: &str) -> Self {
        DataEvent {
            event_type,
            key: None,
            value: None,
            old_value: None,
            timestamp: Utc::now(),
            source: source.to_string(),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    pub fn with_old_value(mut self, old_value: Option<Value>) -> Self {
        self.old_value = old_value;
        self
    }
}

/// Manager-level bus event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerEvent {
    pub name: String,
    pub store: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ManagerEvent {
    pub fn new(name: impl Into<String>, store: Option<&str>, payload: Value) -> Self {
        ManagerEvent {
            name: name.into(),
            store: store.map(str::to_string),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Ring buffer that keeps the newest `capacity` entries.
#[derive(Debug, Clone)]
pub struct EventLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T: Clone> EventLog<T> {
    pub fn new(capacity: usize) -> Self {
        EventLog {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted (or refused) because the log was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
