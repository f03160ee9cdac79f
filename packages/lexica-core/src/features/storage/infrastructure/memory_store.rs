//! In-memory version store.
//!
//! Lock-free concurrent map keyed by record id with full scans for the
//! secondary lookups. Fast enough for the record counts a single deployment
//! holds, and the reference implementation for tests.

use async_trait::async_trait;
use dashmap::DashMap;
use semver::Version;
use uuid::Uuid;

use crate::features::storage::domain::models::{ResourceKind, VersionedRecord};
use crate::features::storage::domain::ports::VersionStore;
use crate::features::storage::error::VersionResult;

#[derive(Default)]
pub struct MemoryVersionStore {
    records: DashMap<Uuid, VersionedRecord>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching<F>(&self, predicate: F) -> Vec<VersionedRecord>
    where
        F: Fn(&VersionedRecord) -> bool,
    {
        self.records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn insert(&self, record: VersionedRecord) -> VersionResult<()> {
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn update(&self, record: &VersionedRecord) -> VersionResult<()> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> VersionResult<Option<VersionedRecord>> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_latest(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> VersionResult<Option<VersionedRecord>> {
        Ok(self
            .matching(|r| {
                r.resource_id == resource_id && r.kind == kind && r.version_info.is_latest
            })
            .into_iter()
            .next())
    }

    async fn find_by_version(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        version: &Version,
    ) -> VersionResult<Option<VersionedRecord>> {
        Ok(self
            .matching(|r| {
                r.resource_id == resource_id && r.kind == kind && &r.version_info.version == version
            })
            .into_iter()
            .next())
    }

    async fn find_by_hash(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        data_hash: &str,
    ) -> VersionResult<Option<VersionedRecord>> {
        Ok(self
            .matching(|r| {
                r.resource_id == resource_id && r.kind == kind && r.version_info.data_hash == data_hash
            })
            .into_iter()
            .next())
    }

    async fn list(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> VersionResult<Vec<VersionedRecord>> {
        Ok(self.matching(|r| r.resource_id == resource_id && r.kind == kind))
    }

    async fn remove(&self, id: Uuid) -> VersionResult<bool> {
        Ok(self.records.remove(&id).is_some())
    }

    async fn list_resource_ids(&self, kind: ResourceKind) -> VersionResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .matching(|r| r.kind == kind)
            .into_iter()
            .map(|r| r.resource_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn count(&self) -> VersionResult<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cache::Namespace;
    use crate::features::storage::domain::models::{StorageMode, VersionInfo};
    use chrono::Utc;
    use serde_json::Map;

    fn record(resource_id: &str, version: Version, is_latest: bool) -> VersionedRecord {
        VersionedRecord {
            id: Uuid::new_v4(),
            resource_id: resource_id.to_string(),
            kind: ResourceKind::Dictionary,
            namespace: Namespace::Dictionary,
            version_info: VersionInfo {
                version,
                created_at: Utc::now(),
                data_hash: "00".repeat(32),
                storage_mode: StorageMode::Inline,
                is_latest,
                supersedes: None,
                superseded_by: None,
                dependencies: vec![],
                metadata: Map::new(),
            },
            content_inline: None,
            content_location: None,
            ttl: None,
            metadata: Map::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookups() {
        let store = MemoryVersionStore::new();

        let v1 = record("hello", Version::new(1, 0, 0), false);
        let v2 = record("hello", Version::new(1, 0, 1), true);
        store.insert(v1.clone()).await.unwrap();
        store.insert(v2.clone()).await.unwrap();

        let latest = store
            .find_latest("hello", ResourceKind::Dictionary)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, v2.id);

        let by_version = store
            .find_by_version("hello", ResourceKind::Dictionary, &Version::new(1, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_version.id, v1.id);

        assert_eq!(
            store.list("hello", ResourceKind::Dictionary).await.unwrap().len(),
            2
        );
        assert!(store.remove(v1.id).await.unwrap());
        assert!(!store.remove(v1.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_resource_ids_distinct() {
        let store = MemoryVersionStore::new();
        store.insert(record("a", Version::new(1, 0, 0), false)).await.unwrap();
        store.insert(record("a", Version::new(1, 0, 1), true)).await.unwrap();
        store.insert(record("b", Version::new(1, 0, 0), true)).await.unwrap();

        let ids = store
            .list_resource_ids(ResourceKind::Dictionary)
            .await
            .unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
