//! Two-tier cache facade: L1 memory → L2 disk with promotion.
//!
//! Data flow:
//! - **Read**: L1 → L2 (decompress, promote to L1) → loader + write-through
//! - **Write**: synchronous to L1, synchronous or background-channel to L2
//! - Loader failures never propagate; L2 write failures leave L1 intact and
//!   are counted, not raised.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::features::cache::config::{namespace_config, Namespace, NamespaceConfig};
use crate::features::cache::disk_backend::{DiskBackend, DiskStats};
use crate::features::cache::error::{CacheError, CacheResult};
use crate::features::cache::memory_cache::NamespaceCache;
use crate::features::cache::stats::{CacheStats, CacheStatsSnapshot};
use crate::features::codec::{canonical_bytes, from_canonical_bytes};
use crate::features::compression::{compress_frame, decompress_frame};

/// Default interval for the periodic L1 TTL sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Error type loaders may return; it is recorded, never propagated.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Background L2 write operation.
enum WriteOp {
    Set {
        key: String,
        frame: Vec<u8>,
        ttl: Option<Duration>,
        tag: String,
    },
    Delete {
        key: String,
    },
}

/// Tuning knobs for the facade.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Ship L2 writes through a background channel instead of awaiting them.
    pub background_l2_writes: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            background_l2_writes: false,
        }
    }
}

/// Per-namespace stats report.
#[derive(Debug, Clone)]
pub struct NamespaceStatsReport {
    pub namespace: Namespace,
    pub memory_count: usize,
    pub stats: CacheStatsSnapshot,
}

/// Aggregate stats report across tiers.
#[derive(Debug, Clone)]
pub struct CacheStatsReport {
    pub l1: CacheStatsSnapshot,
    pub l2: CacheStatsSnapshot,
    pub memory_count: usize,
    pub l2_write_failures: u64,
    pub disk: DiskStats,
}

/// Two-tier cache manager used uniformly by every producer and consumer.
pub struct CacheManager {
    namespaces: Arc<HashMap<Namespace, Arc<NamespaceCache>>>,
    backend: DiskBackend,
    l2_stats: CacheStats,
    l2_write_failures: Arc<AtomicU64>,
    l2_writer: std::sync::Mutex<Option<mpsc::UnboundedSender<WriteOp>>>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl CacheManager {
    /// Build a manager over a disk backend with all 13 default namespaces.
    ///
    /// Must be called from within a tokio runtime when background writes are
    /// enabled.
    pub fn new(backend: DiskBackend, settings: CacheSettings) -> Self {
        Self::with_configs(backend, settings, HashMap::new())
    }

    /// Build a manager with per-namespace config overrides.
    ///
    /// Namespaces not overridden use the default table; configs are immutable
    /// from here on.
    pub fn with_configs(
        backend: DiskBackend,
        settings: CacheSettings,
        overrides: HashMap<Namespace, NamespaceConfig>,
    ) -> Self {
        let namespaces: HashMap<Namespace, Arc<NamespaceCache>> = Namespace::ALL
            .into_iter()
            .map(|ns| {
                let config = overrides
                    .get(&ns)
                    .cloned()
                    .unwrap_or_else(|| namespace_config(ns).clone());
                (ns, Arc::new(NamespaceCache::new(config)))
            })
            .collect();

        let l2_write_failures = Arc::new(AtomicU64::new(0));

        let (l2_writer, writer_handle) = if settings.background_l2_writes {
            let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
            let writer_backend = backend.clone();
            let failures = Arc::clone(&l2_write_failures);

            let handle = tokio::spawn(async move {
                while let Some(op) = rx.recv().await {
                    let result = match op {
                        WriteOp::Set { key, frame, ttl, tag } => {
                            writer_backend.set(&key, frame, ttl, Some(tag)).await
                        }
                        WriteOp::Delete { key } => {
                            writer_backend.delete(&key).await.map(|_| ())
                        }
                    };
                    if let Err(e) = result {
                        failures.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "background L2 write failed");
                    }
                }
            });

            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Self {
            namespaces: Arc::new(namespaces),
            backend,
            l2_stats: CacheStats::new(),
            l2_write_failures,
            l2_writer: std::sync::Mutex::new(l2_writer),
            writer_handle: Mutex::new(writer_handle),
            sweeper: Mutex::new(None),
        }
    }

    fn writer_sender(&self) -> Option<mpsc::UnboundedSender<WriteOp>> {
        self.l2_writer.lock().expect("writer lock poisoned").clone()
    }

    fn namespace_cache(&self, namespace: Namespace) -> &Arc<NamespaceCache> {
        self.namespaces
            .get(&namespace)
            .expect("all namespaces registered at construction")
    }

    /// Resolve a namespace by name.
    pub fn resolve_namespace(name: &str) -> CacheResult<Namespace> {
        Namespace::parse(name).ok_or_else(|| CacheError::UnknownNamespace(name.to_string()))
    }

    pub fn config(&self, namespace: Namespace) -> &NamespaceConfig {
        self.namespace_cache(namespace).config()
    }

    fn backend_key(namespace: Namespace, key: &str) -> String {
        format!("{}:{}", namespace.as_str(), key)
    }

    /// Two-tier get: L1 hit, else L2 read with decompression and promotion.
    pub async fn get(&self, namespace: Namespace, key: &str) -> CacheResult<Option<Arc<Value>>> {
        let ns = self.namespace_cache(namespace);

        if let Some(value) = ns.get(key).await {
            debug!(namespace = %namespace, key, "L1 cache HIT");
            return Ok(Some(value));
        }

        let backend_key = Self::backend_key(namespace, key);
        match self.backend.get(&backend_key).await? {
            Some(frame) => {
                let bytes = decompress_frame(&frame).map_err(|e| CacheError::Decode {
                    kind: "decompress".to_string(),
                    namespace: namespace.as_str().to_string(),
                    detail: e.to_string(),
                })?;
                let value = Arc::new(from_canonical_bytes(&bytes).map_err(|e| {
                    CacheError::Decode {
                        kind: "json".to_string(),
                        namespace: namespace.as_str().to_string(),
                        detail: e.to_string(),
                    }
                })?);

                self.l2_stats.record_hit();
                ns.insert(key.to_string(), Arc::clone(&value)).await;
                debug!(namespace = %namespace, key, "L2 cache HIT, promoted to L1");
                Ok(Some(value))
            }
            None => {
                self.l2_stats.record_miss();
                debug!(namespace = %namespace, key, "cache MISS");
                Ok(None)
            }
        }
    }

    /// Cascade get with a loader fallback.
    ///
    /// The loader is invoked with no cache locks held. Its failures are
    /// swallowed into `None` with a recorded warning; successful loads are
    /// written through both tiers.
    pub async fn get_or_load<F, Fut>(
        &self,
        namespace: Namespace,
        key: &str,
        loader: F,
    ) -> CacheResult<Option<Arc<Value>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Value>, LoaderError>>,
    {
        if let Some(value) = self.get(namespace, key).await? {
            return Ok(Some(value));
        }

        match loader().await {
            Ok(Some(value)) => {
                self.set(namespace, key, value.clone(), None).await?;
                Ok(Some(Arc::new(value)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(namespace = %namespace, key, error = %e, "cache loader failed");
                Ok(None)
            }
        }
    }

    /// Store in both tiers.
    ///
    /// L1 is updated synchronously; the L2 write is encoded+compressed and
    /// either awaited or shipped to the background writer. L2 failure leaves
    /// the L1 value in place and is counted rather than propagated.
    pub async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: Value,
        ttl_override: Option<Duration>,
    ) -> CacheResult<()> {
        let ns = self.namespace_cache(namespace);
        let value = Arc::new(value);
        ns.insert(key.to_string(), Arc::clone(&value)).await;

        let config = ns.config();
        let bytes = canonical_bytes(&value)?;
        let frame = compress_frame(&bytes, config.compression).map_err(|e| CacheError::Encode {
            namespace: namespace.as_str().to_string(),
            detail: e.to_string(),
        })?;
        let ttl = ttl_override.or(config.disk_ttl);
        let backend_key = Self::backend_key(namespace, key);
        let tag = namespace.as_str().to_string();

        if let Some(writer) = self.writer_sender() {
            writer
                .send(WriteOp::Set {
                    key: backend_key,
                    frame,
                    ttl,
                    tag,
                })
                .map_err(|_| CacheError::Internal("L2 writer channel closed".to_string()))?;
        } else if let Err(e) = self.backend.set(&backend_key, frame, ttl, Some(tag)).await {
            self.l2_write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(namespace = %namespace, key, error = %e, "L2 write failed, L1 retains value");
        }

        Ok(())
    }

    /// Delete from both tiers.
    pub async fn delete(&self, namespace: Namespace, key: &str) -> CacheResult<bool> {
        let l1_removed = self.namespace_cache(namespace).remove(key).await;

        let backend_key = Self::backend_key(namespace, key);
        let l2_removed = if let Some(writer) = self.writer_sender() {
            writer
                .send(WriteOp::Delete { key: backend_key })
                .map_err(|_| CacheError::Internal("L2 writer channel closed".to_string()))?;
            false
        } else {
            self.backend.delete(&backend_key).await?
        };

        Ok(l1_removed || l2_removed)
    }

    /// Clear all entries in one namespace, both tiers.
    pub async fn clear_namespace(&self, namespace: Namespace) -> CacheResult<()> {
        self.namespace_cache(namespace).clear().await;
        self.backend
            .clear_pattern(&format!("{}:", namespace.as_str()))
            .await?;
        Ok(())
    }

    /// Clear every namespace and the whole disk store; resets counters.
    pub async fn clear_all(&self) -> CacheResult<()> {
        for ns in self.namespaces.values() {
            ns.clear().await;
            ns.reset_stats();
        }
        self.l2_stats.reset();
        self.backend.clear_all().await
    }

    /// Scan all namespaces and evict expired L1 entries.
    ///
    /// Safe to call concurrently with other operations.
    pub async fn cleanup_expired_entries(&self) -> usize {
        let mut total = 0;
        for ns in self.namespaces.values() {
            total += ns.sweep_expired().await;
        }
        if total > 0 {
            debug!(total, "TTL cleanup evicted expired entries");
        }
        total
    }

    pub async fn namespace_stats(&self, namespace: Namespace) -> NamespaceStatsReport {
        let ns = self.namespace_cache(namespace);
        NamespaceStatsReport {
            namespace,
            memory_count: ns.len().await,
            stats: ns.stats(),
        }
    }

    /// Aggregate statistics across all namespaces and both tiers.
    pub async fn get_stats(&self) -> CacheStatsReport {
        let mut l1 = CacheStatsSnapshot::default();
        let mut memory_count = 0;
        for ns in self.namespaces.values() {
            l1 = l1.merge(&ns.stats());
            memory_count += ns.len().await;
        }

        CacheStatsReport {
            l1,
            l2: self.l2_stats.snapshot(),
            memory_count,
            l2_write_failures: self.l2_write_failures.load(Ordering::Relaxed),
            disk: self.backend.stats(),
        }
    }

    pub async fn l1_len(&self, namespace: Namespace) -> usize {
        self.namespace_cache(namespace).len().await
    }

    /// Start the periodic TTL sweeper. Idempotent; the previous sweeper is
    /// stopped first.
    pub async fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        self.stop_sweeper().await;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; consume it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.cleanup_expired_entries().await;
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        *self.sweeper.lock().await = Some((shutdown_tx, handle));
    }

    async fn stop_sweeper(&self) {
        if let Some((shutdown_tx, handle)) = self.sweeper.lock().await.take() {
            let _ = shutdown_tx.send(());
            let _ = handle.await;
        }
    }

    /// Drain background tasks cleanly.
    ///
    /// Drops the writer sender so the channel closes, then joins the writer
    /// after it has drained all pending operations.
    pub async fn shutdown(&self) {
        self.stop_sweeper().await;

        self.l2_writer.lock().expect("writer lock poisoned").take();
        if let Some(handle) = self.writer_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn manager() -> (Arc<CacheManager>, TempDir) {
        let temp = TempDir::new().unwrap();
        let backend = DiskBackend::new(temp.path()).unwrap();
        let manager = Arc::new(CacheManager::new(backend, CacheSettings::default()));
        (manager, temp)
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let (manager, _temp) = manager().await;

        manager
            .set(Namespace::Dictionary, "k", json!({"v": 1}), None)
            .await
            .unwrap();
        let value = manager.get(Namespace::Dictionary, "k").await.unwrap().unwrap();
        assert_eq!(*value, json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_delete_removes_both_tiers() {
        let (manager, _temp) = manager().await;

        manager
            .set(Namespace::Dictionary, "k", json!(1), None)
            .await
            .unwrap();
        assert!(manager.delete(Namespace::Dictionary, "k").await.unwrap());
        assert!(manager.get(Namespace::Dictionary, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_l2_promotion_after_restart() {
        let temp = TempDir::new().unwrap();

        {
            let backend = DiskBackend::new(temp.path()).unwrap();
            let manager = CacheManager::new(backend, CacheSettings::default());
            manager
                .set(Namespace::Dictionary, "k", json!({"v": 1}), None)
                .await
                .unwrap();
        }

        // Fresh manager simulates a restart: L1 empty, L2 retained.
        let backend = DiskBackend::new(temp.path()).unwrap();
        let manager = CacheManager::new(backend, CacheSettings::default());

        let value = manager.get(Namespace::Dictionary, "k").await.unwrap().unwrap();
        assert_eq!(*value, json!({"v": 1}));

        let stats = manager.get_stats().await;
        assert_eq!(stats.l2.hits, 1);
        assert_eq!(stats.l1.hits, 0);
        assert_eq!(manager.l1_len(Namespace::Dictionary).await, 1);

        // Second read is an L1 hit
        manager.get(Namespace::Dictionary, "k").await.unwrap().unwrap();
        assert_eq!(manager.get_stats().await.l1.hits, 1);
    }

    #[tokio::test]
    async fn test_loader_invoked_on_miss_and_written_through() {
        let (manager, _temp) = manager().await;

        let value = manager
            .get_or_load(Namespace::Api, "computed", || async {
                Ok(Some(json!({"loaded": true})))
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*value, json!({"loaded": true}));

        // Now cached: loader must not run again
        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&called);
        let value = manager
            .get_or_load(Namespace::Api, "computed", move || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(Some(json!({"loaded": false})))
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*value, json!({"loaded": true}));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_loader_failure_swallowed() {
        let (manager, _temp) = manager().await;

        let result = manager
            .get_or_load(Namespace::Api, "failing", || async {
                Err::<Option<Value>, LoaderError>("boom".into())
            })
            .await
            .unwrap();
        assert!(result.is_none());

        // Cache state unaffected
        assert!(manager.get(Namespace::Api, "failing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_namespace_scoped() {
        let (manager, _temp) = manager().await;

        manager.set(Namespace::Trie, "a", json!(1), None).await.unwrap();
        manager.set(Namespace::Corpus, "b", json!(2), None).await.unwrap();

        manager.clear_namespace(Namespace::Trie).await.unwrap();

        assert!(manager.get(Namespace::Trie, "a").await.unwrap().is_none());
        assert!(manager.get(Namespace::Corpus, "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired_entries_counts() {
        let (manager, _temp) = manager().await;

        // Wotd has a 1-day TTL; entries inserted now are not expired, so
        // cleanup finds nothing.
        for i in 0..10 {
            manager
                .set(Namespace::Wotd, &format!("k{}", i), json!(i), None)
                .await
                .unwrap();
        }
        assert_eq!(manager.cleanup_expired_entries().await, 0);
    }

    #[tokio::test]
    async fn test_background_writer_persists() {
        let temp = TempDir::new().unwrap();
        let backend = DiskBackend::new(temp.path()).unwrap();
        let manager = CacheManager::new(
            backend.clone(),
            CacheSettings {
                background_l2_writes: true,
            },
        );

        manager
            .set(Namespace::Search, "bg", json!({"x": 1}), None)
            .await
            .unwrap();

        // Give the writer a moment to drain.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(backend.get("search:bg").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeper_starts_and_stops() {
        let (manager, _temp) = manager().await;

        manager.start_sweeper(Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_compressed_namespace_round_trip() {
        let (manager, _temp) = manager().await;

        // Corpus uses zstd; payload above the 1 KiB floor so compression kicks in.
        let words: Vec<String> = (0..500).map(|i| format!("word{}", i)).collect();
        let value = json!({"vocabulary": words});

        manager
            .set(Namespace::Corpus, "big", value.clone(), None)
            .await
            .unwrap();

        // Evict from L1 to force the L2 + decompress path.
        manager.namespace_cache(Namespace::Corpus).clear().await;

        let loaded = manager.get(Namespace::Corpus, "big").await.unwrap().unwrap();
        assert_eq!(*loaded, value);
    }
}
