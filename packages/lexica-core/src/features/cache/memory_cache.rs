//! L1 per-namespace memory cache: O(1) LRU with TTL expiry.
//!
//! One mutex per namespace protects the ordered map; it is held only for
//! in-memory mutation and never across an await into the disk tier. Evictions
//! are performed manually (evict-until-under-limit) so every eviction is
//! counted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::features::cache::config::NamespaceConfig;
use crate::features::cache::stats::{CacheStats, CacheStatsSnapshot};

struct MemoryEntry {
    value: Arc<Value>,
    inserted_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.inserted_at.elapsed() > ttl,
            None => false,
        }
    }
}

/// Per-namespace L1 state: ordered map + immutable stats snapshots.
pub struct NamespaceCache {
    config: NamespaceConfig,
    entries: Mutex<LruCache<String, MemoryEntry>>,
    stats: CacheStats,
}

impl NamespaceCache {
    pub fn new(config: NamespaceConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(LruCache::unbounded()),
            stats: CacheStats::new(),
        }
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Get a value; checks TTL, promotes valid hits to most-recently-used.
    ///
    /// Expired entries are removed and counted as evictions.
    pub async fn get(&self, key: &str) -> Option<Arc<Value>> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(key) {
            Some(entry) => {
                if entry.is_expired(self.config.memory_ttl) {
                    true
                } else {
                    let value = Arc::clone(&entry.value);
                    self.stats.record_hit();
                    return Some(value);
                }
            }
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            entries.pop(key);
            self.stats.record_eviction();
            debug!(namespace = %self.config.namespace, key, "L1 entry expired");
        }
        self.stats.record_miss();
        None
    }

    /// Insert a value, evicting oldest entries while at or over the limit.
    pub async fn insert(&self, key: String, value: Arc<Value>) {
        let mut entries = self.entries.lock().await;

        while entries.len() >= self.config.memory_limit && !entries.contains(&key) {
            if entries.pop_lru().is_none() {
                break;
            }
            self.stats.record_eviction();
        }

        entries.put(
            key,
            MemoryEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Remove every expired entry; returns the number evicted.
    pub async fn sweep_expired(&self) -> usize {
        let ttl = match self.config.memory_ttl {
            Some(ttl) => ttl,
            None => return 0,
        };

        let mut entries = self.entries.lock().await;
        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            entries.pop(key);
        }

        let evicted = expired_keys.len();
        if evicted > 0 {
            self.stats.record_evictions(evicted as u64);
            debug!(
                namespace = %self.config.namespace,
                evicted, "TTL sweep evicted expired entries"
            );
        }
        evicted
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}
