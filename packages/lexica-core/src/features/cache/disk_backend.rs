//! L2 disk backend: content-addressed file store with LRU size bounding.
//!
//! Layout:
//! - Data files: `{root}/data/{key_hash}.bin` (atomic tmp+rename writes)
//! - Index: `{root}/index.json` (key → metadata), reloaded on startup
//!
//! Keys are `namespace:key` strings. The total on-disk size stays under the
//! configured limit via least-recently-used eviction. Each entry carries one
//! primary tag (its namespace) for bulk removal. All blocking I/O runs on the
//! blocking executor; accesses are serialized per-key while reads to
//! different keys proceed in parallel.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::features::cache::error::{CacheError, CacheResult};
use crate::features::codec::hash_bytes;

/// Default total size bound: 10 GiB.
pub const DEFAULT_SIZE_LIMIT: u64 = 10 * 1024 * 1024 * 1024;

const INDEX_FILE: &str = "index.json";
const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntryMeta {
    file: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    tag: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiskIndex {
    entries: HashMap<String, DiskEntryMeta>,
}

impl DiskIndex {
    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

/// Backend statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DiskStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub size_limit: u64,
    pub eviction_policy: &'static str,
}

struct DiskInner {
    root: PathBuf,
    size_limit: u64,
    index: Mutex<DiskIndex>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    reinitialized: AtomicBool,
}

impl DiskInner {
    fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn file_path(&self, meta: &DiskEntryMeta) -> PathBuf {
        self.data_dir().join(&meta.file)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_index(&self) -> CacheResult<()> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(());
        }

        match fs::read(&path).map_err(CacheError::from).and_then(|bytes| {
            serde_json::from_slice::<DiskIndex>(&bytes)
                .map_err(|e| CacheError::Corruption(format!("index parse failed: {}", e)))
        }) {
            Ok(index) => {
                *self.index.lock().expect("index lock poisoned") = index;
                Ok(())
            }
            Err(e) => {
                // One recovery attempt: wipe and start empty. Persistent
                // corruption after that surfaces as a backend error.
                if self.reinitialized.swap(true, Ordering::SeqCst) {
                    return Err(CacheError::Backend(format!(
                        "disk index corrupt after reinitialization: {}",
                        e
                    )));
                }
                warn!(error = %e, "disk cache index corrupt, reinitializing");
                let _ = fs::remove_file(&path);
                let _ = fs::remove_dir_all(self.data_dir());
                fs::create_dir_all(self.data_dir())?;
                *self.index.lock().expect("index lock poisoned") = DiskIndex::default();
                Ok(())
            }
        }
    }

    fn persist_index(&self) -> CacheResult<()> {
        let bytes = {
            let index = self.index.lock().expect("index lock poisoned");
            serde_json::to_vec(&*index)
                .map_err(|e| CacheError::Backend(format!("index serialize failed: {}", e)))?
        };

        let path = self.index_path();
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn blocking_get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().expect("key lock poisoned");

        let meta = {
            let mut index = self.index.lock().expect("index lock poisoned");
            match index.entries.get_mut(key) {
                Some(meta) => {
                    if meta
                        .expires_at
                        .map(|deadline| Utc::now() > deadline)
                        .unwrap_or(false)
                    {
                        let meta = index.entries.remove(key).expect("just looked up");
                        drop(index);
                        let _ = fs::remove_file(self.file_path(&meta));
                        self.persist_index()?;
                        debug!(key, "L2 entry expired");
                        return Ok(None);
                    }
                    meta.last_access = Utc::now();
                    meta.clone()
                }
                None => return Ok(None),
            }
        };

        match fs::read(self.file_path(&meta)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Stale index entry; drop it and report a miss.
                self.index
                    .lock()
                    .expect("index lock poisoned")
                    .entries
                    .remove(key);
                self.persist_index()?;
                warn!(key, "L2 data file missing, dropped stale index entry");
                Ok(None)
            }
            Err(e) => Err(CacheError::Backend(format!("read failed for {}: {}", key, e))),
        }
    }

    fn blocking_set(
        &self,
        key: &str,
        bytes: &[u8],
        ttl: Option<Duration>,
        tag: Option<String>,
    ) -> CacheResult<()> {
        if bytes.len() as u64 > self.size_limit {
            return Err(CacheError::ContentTooLarge {
                size: bytes.len() as u64,
                limit: self.size_limit,
            });
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().expect("key lock poisoned");

        let file_name = format!("{}.bin", &hash_bytes(key.as_bytes())[..16]);
        let path = self.data_dir().join(&file_name);
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        let now = Utc::now();
        let expires_at = ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok().map(|d| now + d));

        let evicted: Vec<DiskEntryMeta> = {
            let mut index = self.index.lock().expect("index lock poisoned");
            index.entries.insert(
                key.to_string(),
                DiskEntryMeta {
                    file: file_name,
                    size_bytes: bytes.len() as u64,
                    created_at: now,
                    last_access: now,
                    expires_at,
                    tag,
                },
            );

            // LRU eviction until under the size limit
            let mut evicted = Vec::new();
            while index.total_size() > self.size_limit {
                let oldest = index
                    .entries
                    .iter()
                    .filter(|(k, _)| k.as_str() != key)
                    .min_by_key(|(_, meta)| meta.last_access)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        if let Some(meta) = index.entries.remove(&k) {
                            evicted.push(meta);
                        }
                    }
                    None => break,
                }
            }
            evicted
        };

        for meta in &evicted {
            let _ = fs::remove_file(self.file_path(meta));
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "L2 size-bound eviction");
        }

        self.persist_index()
    }

    fn blocking_delete(&self, key: &str) -> CacheResult<bool> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().expect("key lock poisoned");

        let removed = self
            .index
            .lock()
            .expect("index lock poisoned")
            .entries
            .remove(key);

        match removed {
            Some(meta) => {
                let _ = fs::remove_file(self.file_path(&meta));
                self.persist_index()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn blocking_remove_where<F>(&self, predicate: F) -> CacheResult<usize>
    where
        F: Fn(&str, &DiskEntryMeta) -> bool,
    {
        let removed: Vec<DiskEntryMeta> = {
            let mut index = self.index.lock().expect("index lock poisoned");
            let keys: Vec<String> = index
                .entries
                .iter()
                .filter(|(k, meta)| predicate(k, meta))
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter()
                .filter_map(|k| index.entries.remove(k))
                .collect()
        };

        for meta in &removed {
            let _ = fs::remove_file(self.file_path(meta));
        }
        if !removed.is_empty() {
            self.persist_index()?;
        }
        Ok(removed.len())
    }

    fn blocking_clear_all(&self) -> CacheResult<()> {
        self.index
            .lock()
            .expect("index lock poisoned")
            .entries
            .clear();

        let data_dir = self.data_dir();
        if data_dir.exists() {
            fs::remove_dir_all(&data_dir)?;
        }
        fs::create_dir_all(&data_dir)?;
        self.persist_index()
    }
}

/// Size-bounded, restart-safe disk store.
#[derive(Clone)]
pub struct DiskBackend {
    inner: Arc<DiskInner>,
}

impl DiskBackend {
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        Self::with_size_limit(root, DEFAULT_SIZE_LIMIT)
    }

    pub fn with_size_limit(root: impl Into<PathBuf>, size_limit: u64) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(DATA_DIR))?;

        let inner = Arc::new(DiskInner {
            root,
            size_limit,
            index: Mutex::new(DiskIndex::default()),
            key_locks: DashMap::new(),
            reinitialized: AtomicBool::new(false),
        });
        inner.load_index()?;

        Ok(Self { inner })
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || inner.blocking_get(&key))
            .await
            .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
    }

    pub async fn set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl: Option<Duration>,
        tag: Option<String>,
    ) -> CacheResult<()> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || inner.blocking_set(&key, &bytes, ttl, tag))
            .await
            .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
    }

    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || inner.blocking_delete(&key))
            .await
            .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
    }

    /// Remove every entry whose key starts with `prefix`.
    pub async fn clear_pattern(&self, prefix: &str) -> CacheResult<usize> {
        let inner = Arc::clone(&self.inner);
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            inner.blocking_remove_where(|key, _| key.starts_with(&prefix))
        })
        .await
        .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
    }

    /// Remove every entry carrying the given primary tag.
    pub async fn evict_tag(&self, tag: &str) -> CacheResult<usize> {
        let inner = Arc::clone(&self.inner);
        let tag = tag.to_string();
        tokio::task::spawn_blocking(move || {
            inner.blocking_remove_where(|_, meta| meta.tag.as_deref() == Some(tag.as_str()))
        })
        .await
        .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
    }

    pub async fn clear_all(&self) -> CacheResult<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.blocking_clear_all())
            .await
            .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
    }

    pub fn stats(&self) -> DiskStats {
        let index = self.inner.index.lock().expect("index lock poisoned");
        DiskStats {
            entry_count: index.entries.len(),
            total_size_bytes: index.total_size(),
            size_limit: self.inner.size_limit,
            eviction_policy: "least-recently-used",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn backend(limit: u64) -> (DiskBackend, TempDir) {
        let temp = TempDir::new().unwrap();
        let backend = DiskBackend::with_size_limit(temp.path(), limit).unwrap();
        (backend, temp)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (backend, _temp) = backend(DEFAULT_SIZE_LIMIT).await;

        backend
            .set("dictionary:hello", b"payload".to_vec(), None, None)
            .await
            .unwrap();
        assert_eq!(
            backend.get("dictionary:hello").await.unwrap().unwrap(),
            b"payload"
        );

        assert!(backend.delete("dictionary:hello").await.unwrap());
        assert!(!backend.delete("dictionary:hello").await.unwrap());
        assert!(backend.get("dictionary:hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let temp = TempDir::new().unwrap();

        {
            let backend = DiskBackend::new(temp.path()).unwrap();
            backend
                .set("corpus:words", b"persisted".to_vec(), None, None)
                .await
                .unwrap();
        }

        let backend = DiskBackend::new(temp.path()).unwrap();
        assert_eq!(
            backend.get("corpus:words").await.unwrap().unwrap(),
            b"persisted"
        );
    }

    #[tokio::test]
    async fn test_size_bound_lru_eviction() {
        let (backend, _temp) = backend(3000).await;

        backend
            .set("ns:a", vec![0u8; 1000], None, None)
            .await
            .unwrap();
        backend
            .set("ns:b", vec![1u8; 1000], None, None)
            .await
            .unwrap();
        backend
            .set("ns:c", vec![2u8; 1000], None, None)
            .await
            .unwrap();

        // Touch "a" so "b" is least recently used
        backend.get("ns:a").await.unwrap();

        backend
            .set("ns:d", vec![3u8; 1000], None, None)
            .await
            .unwrap();

        assert!(backend.get("ns:b").await.unwrap().is_none());
        assert!(backend.get("ns:a").await.unwrap().is_some());
        assert!(backend.stats().total_size_bytes <= 3000);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let (backend, _temp) = backend(DEFAULT_SIZE_LIMIT).await;

        backend
            .set(
                "ns:short",
                b"gone soon".to_vec(),
                Some(Duration::from_millis(20)),
                None,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(backend.get("ns:short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_pattern() {
        let (backend, _temp) = backend(DEFAULT_SIZE_LIMIT).await;

        backend.set("trie:a", vec![1], None, None).await.unwrap();
        backend.set("trie:b", vec![2], None, None).await.unwrap();
        backend.set("corpus:c", vec![3], None, None).await.unwrap();

        let removed = backend.clear_pattern("trie:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(backend.get("trie:a").await.unwrap().is_none());
        assert!(backend.get("corpus:c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_evict_tag() {
        let (backend, _temp) = backend(DEFAULT_SIZE_LIMIT).await;

        backend
            .set("a:1", vec![1], None, Some("search".to_string()))
            .await
            .unwrap();
        backend
            .set("b:2", vec![2], None, Some("search".to_string()))
            .await
            .unwrap();
        backend
            .set("c:3", vec![3], None, Some("corpus".to_string()))
            .await
            .unwrap();

        assert_eq!(backend.evict_tag("search").await.unwrap(), 2);
        assert!(backend.get("c:3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_index_reinitializes_once() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(DATA_DIR)).unwrap();
        fs::write(temp.path().join(INDEX_FILE), b"{not json!!").unwrap();

        let backend = DiskBackend::new(temp.path()).unwrap();
        backend.set("ns:k", vec![9], None, None).await.unwrap();
        assert_eq!(backend.get("ns:k").await.unwrap().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let (backend, _temp) = backend(100).await;
        let err = backend
            .set("ns:big", vec![0u8; 200], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::ContentTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (backend, _temp) = backend(DEFAULT_SIZE_LIMIT).await;

        for i in 0..5 {
            backend
                .set(&format!("ns:{}", i), vec![i as u8], None, None)
                .await
                .unwrap();
        }
        backend.clear_all().await.unwrap();

        assert_eq!(backend.stats().entry_count, 0);
        for i in 0..5 {
            assert!(backend.get(&format!("ns:{}", i)).await.unwrap().is_none());
        }
    }
}
