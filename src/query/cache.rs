use lru::LruCache;
use std::num::NonZeroUsize;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::core::types::Value;

/// One memoized query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub ttl: u64,  // milliseconds, 0 = never expires
    pub hits: u64,
}

impl CacheEntry {
    pub fn new(key: String, value: Value, ttl: u64, now: DateTime<Utc>) -> Self {
        CacheEntry { key, value, timestamp: now, ttl, hits: 0 }
    }

    /// Expired once `now - timestamp >= ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.ttl == 0 {
            return false;
        }
        let age = now.signed_duration_since(self.timestamp).num_milliseconds();
        age >= self.ttl as i64
    }
}

/// Store-level result cache, LRU-bounded with per-entry TTL
pub struct QueryCache {
    pub cache: LruCache<String, CacheEntry>,
    pub size_limit: usize,
    pub hit_count: u64,
    pub miss_count: u64,
}

impl QueryCache {
    pub fn new(size_limit: usize) -> Self {
        let cap = NonZeroUsize::new(size_limit.max(1)).unwrap_or(NonZeroUsize::MIN);
        QueryCache {
            cache: LruCache::new(cap),
            size_limit: cap.get(),
            hit_count: 0,
            miss_count: 0,
        }
    }

    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let expired = match self.cache.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.hits += 1;
                self.hit_count += 1;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.cache.pop(key);
        }
        self.miss_count += 1;
        None
    }

    pub fn put(&mut self, key: String, value: Value, ttl: u64, now: DateTime<Utc>) {
        let entry = CacheEntry::new(key.clone(), value, ttl, now);
        self.cache.put(key, entry);
    }

    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.cache.peek(key)
    }

    /// Drop every expired entry. Returns how many were evicted.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            self.cache.pop(key);
        }
        expired.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            size: self.cache.len(),
            capacity: self.size_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
