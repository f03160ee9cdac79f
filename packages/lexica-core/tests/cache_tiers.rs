//! Two-tier cache behavior: cascade, restart survival, TTL sweep, LRU.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use lexica_core::features::compression::Compression;
use lexica_core::{CacheManager, CacheSettings, DiskBackend, Namespace, NamespaceConfig};

fn short_ttl_config(namespace: Namespace, memory_limit: usize, ttl_ms: u64) -> NamespaceConfig {
    NamespaceConfig {
        namespace,
        memory_limit,
        memory_ttl: Some(Duration::from_millis(ttl_ms)),
        disk_ttl: None,
        compression: Compression::None,
    }
}

#[tokio::test]
async fn set_get_delete_round_trip() {
    let temp = TempDir::new().unwrap();
    let backend = DiskBackend::new(temp.path()).unwrap();
    let manager = CacheManager::new(backend, CacheSettings::default());

    manager
        .set(Namespace::Dictionary, "k", json!({"v": 1}), None)
        .await
        .unwrap();
    let value = manager
        .get(Namespace::Dictionary, "k")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*value, json!({"v": 1}));

    assert!(manager.delete(Namespace::Dictionary, "k").await.unwrap());
    assert!(manager
        .get(Namespace::Dictionary, "k")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn restart_retains_l2_and_promotes() {
    let temp = TempDir::new().unwrap();

    {
        let backend = DiskBackend::new(temp.path()).unwrap();
        let manager = CacheManager::new(backend, CacheSettings::default());
        manager
            .set(Namespace::Dictionary, "k", json!({"v": 1}), None)
            .await
            .unwrap();
    }

    // Fresh process: L1 empty, L2 on disk.
    let backend = DiskBackend::new(temp.path()).unwrap();
    let manager = CacheManager::new(backend, CacheSettings::default());

    assert_eq!(manager.l1_len(Namespace::Dictionary).await, 0);

    let value = manager
        .get(Namespace::Dictionary, "k")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*value, json!({"v": 1}));

    let stats = manager.get_stats().await;
    assert_eq!(stats.l2.hits, 1);
    assert_eq!(stats.l1.hits, 0);
    assert_eq!(manager.l1_len(Namespace::Dictionary).await, 1);
}

#[tokio::test]
async fn ttl_sweep_evicts_and_counts() {
    let temp = TempDir::new().unwrap();
    let backend = DiskBackend::new(temp.path()).unwrap();

    let mut overrides = HashMap::new();
    overrides.insert(
        Namespace::Wotd,
        short_ttl_config(Namespace::Wotd, 50, 100),
    );
    let manager = CacheManager::with_configs(backend, CacheSettings::default(), overrides);

    for i in 0..10 {
        manager
            .set(Namespace::Wotd, &format!("k{}", i), json!(i), None)
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    let evicted = manager.cleanup_expired_entries().await;
    assert_eq!(evicted, 10);
    assert_eq!(manager.l1_len(Namespace::Wotd).await, 0);
    assert_eq!(manager.namespace_stats(Namespace::Wotd).await.stats.evictions, 10);
}

#[tokio::test]
async fn lru_evicts_exactly_one_oldest() {
    let temp = TempDir::new().unwrap();
    let backend = DiskBackend::new(temp.path()).unwrap();

    let limit = 5;
    let mut overrides = HashMap::new();
    overrides.insert(
        Namespace::Api,
        NamespaceConfig {
            namespace: Namespace::Api,
            memory_limit: limit,
            memory_ttl: None,
            disk_ttl: None,
            compression: Compression::None,
        },
    );
    let manager = CacheManager::with_configs(backend, CacheSettings::default(), overrides);

    for i in 0..=limit {
        manager
            .set(Namespace::Api, &format!("k{}", i), json!(i), None)
            .await
            .unwrap();
    }

    let stats = manager.namespace_stats(Namespace::Api).await;
    assert_eq!(stats.stats.evictions, 1);
    assert_eq!(stats.memory_count, limit);
    assert_eq!(manager.l1_len(Namespace::Api).await, limit);
}

#[tokio::test]
async fn periodic_sweeper_runs_and_shuts_down() {
    let temp = TempDir::new().unwrap();
    let backend = DiskBackend::new(temp.path()).unwrap();

    let mut overrides = HashMap::new();
    overrides.insert(Namespace::Wotd, short_ttl_config(Namespace::Wotd, 50, 40));
    let manager = Arc::new(CacheManager::with_configs(
        backend,
        CacheSettings::default(),
        overrides,
    ));

    for i in 0..5 {
        manager
            .set(Namespace::Wotd, &format!("k{}", i), json!(i), None)
            .await
            .unwrap();
    }

    manager.start_sweeper(Duration::from_millis(50)).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(manager.l1_len(Namespace::Wotd).await, 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn clear_namespace_and_clear_all() {
    let temp = TempDir::new().unwrap();
    let backend = DiskBackend::new(temp.path()).unwrap();
    let manager = CacheManager::new(backend, CacheSettings::default());

    manager
        .set(Namespace::Trie, "t", json!(1), None)
        .await
        .unwrap();
    manager
        .set(Namespace::Corpus, "c", json!(2), None)
        .await
        .unwrap();

    manager.clear_namespace(Namespace::Trie).await.unwrap();
    assert!(manager.get(Namespace::Trie, "t").await.unwrap().is_none());
    assert!(manager.get(Namespace::Corpus, "c").await.unwrap().is_some());

    manager.clear_all().await.unwrap();
    assert!(manager.get(Namespace::Corpus, "c").await.unwrap().is_none());
    assert_eq!(manager.get_stats().await.disk.entry_count, 0);
}

#[tokio::test]
async fn compressed_namespaces_round_trip_after_restart() {
    let temp = TempDir::new().unwrap();
    let words: Vec<String> = (0..2000).map(|i| format!("word-{:05}", i)).collect();
    let payload = json!({"vocabulary": words});

    {
        let backend = DiskBackend::new(temp.path()).unwrap();
        let manager = CacheManager::new(backend, CacheSettings::default());
        // zstd (corpus), lz4 (trie), gzip (literature)
        for ns in [Namespace::Corpus, Namespace::Trie, Namespace::Literature] {
            manager.set(ns, "payload", payload.clone(), None).await.unwrap();
        }
    }

    let backend = DiskBackend::new(temp.path()).unwrap();
    let manager = CacheManager::new(backend, CacheSettings::default());
    for ns in [Namespace::Corpus, Namespace::Trie, Namespace::Literature] {
        let value = manager.get(ns, "payload").await.unwrap().unwrap();
        assert_eq!(*value, payload, "round trip failed for {}", ns.as_str());
    }
}
