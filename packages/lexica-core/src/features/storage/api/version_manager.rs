//! Centralized manager for all versioned data operations.
//!
//! Uses the two-tier cache for content and record lookups and a
//! [`VersionStore`] port for the chain metadata. Chain mutations happen under
//! a per-`(resource_id, kind)` async mutex, acquired only after content has
//! been canonicalized and hashed.
//!
//! Snapshot placement: the newest version of a chain always holds full
//! content. When superseded it is demoted to a backward delta against its
//! successor, unless the snapshot policy (version 0 and every N-th) retains
//! it, so old versions reconstruct by walking deltas newest→oldest.

use std::sync::Arc;

use chrono::Utc;
use semver::Version;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::features::cache::{CacheManager, Namespace};
use crate::features::codec::{content_hash, encode_content, to_canonical_value, SKIP_LARGE_CONTENT};
use crate::features::delta::{
    compute_delta, reconstruct_version, should_keep_as_snapshot, Delta, DeltaConfig,
};
use crate::features::storage::domain::models::{
    ContentLocation, DependencyRef, ResourceKind, StorageMode, VersionConfig, VersionInfo,
    VersionSummary, VersionedRecord,
};
use crate::features::storage::domain::ports::VersionStore;
use crate::features::storage::error::{VersionError, VersionResult};

/// Encoded sizes below this stay inline in the record.
pub const INLINE_CONTENT_MAX: usize = 1024;

/// Default upper bound on a single version's canonical content.
pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 100 * 1024 * 1024;

/// Build the standardized cache key for a resource.
///
/// `kind:resource_id[:vVERSION][:hash8]` with the id sanitized to be
/// separator-safe.
pub fn generate_cache_key(
    kind: ResourceKind,
    resource_id: &str,
    version: Option<&Version>,
    hash: Option<&str>,
) -> String {
    let safe_id = resource_id.replace(['/', ' ', ':'], "_");
    let mut key = format!("{}:{}", kind.as_str(), safe_id);
    if let Some(version) = version {
        key.push_str(&format!(":v{}", version));
    }
    if let Some(hash) = hash {
        key.push(':');
        key.push_str(&hash[..hash.len().min(8)]);
    }
    key
}

/// Manager tuning.
#[derive(Debug, Clone)]
pub struct VersionManagerSettings {
    pub delta: DeltaConfig,
    pub max_content_bytes: u64,

    /// Extend dedup lookups across every kind sharing the resource id.
    /// Off by default; the intended scope of the original behavior is
    /// ambiguous.
    pub dedup_across_kinds: bool,
}

impl Default for VersionManagerSettings {
    fn default() -> Self {
        Self {
            delta: DeltaConfig::default(),
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            dedup_across_kinds: false,
        }
    }
}

/// Save request for one new version.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub namespace: Option<Namespace>,
    pub content: Map<String, Value>,
    pub config: VersionConfig,
    pub metadata: Map<String, Value>,
    pub dependencies: Vec<DependencyRef>,
}

impl SaveRequest {
    pub fn new(resource_id: impl Into<String>, kind: ResourceKind, content: Map<String, Value>) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
            namespace: None,
            content,
            config: VersionConfig::new(),
            metadata: Map::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: VersionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<DependencyRef>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }
}

pub struct VersionManager {
    store: Arc<dyn VersionStore>,
    cache: Arc<CacheManager>,
    settings: VersionManagerSettings,
    chain_locks: dashmap::DashMap<(String, ResourceKind), Arc<Mutex<()>>>,
}

impl VersionManager {
    pub fn new(
        store: Arc<dyn VersionStore>,
        cache: Arc<CacheManager>,
        settings: VersionManagerSettings,
    ) -> Self {
        Self {
            store,
            cache,
            settings,
            chain_locks: dashmap::DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn delta_config(&self) -> DeltaConfig {
        self.settings.delta
    }

    fn chain_lock(&self, resource_id: &str, kind: ResourceKind) -> Arc<Mutex<()>> {
        self.chain_locks
            .entry((resource_id.to_string(), kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Save a new version of a resource.
    ///
    /// Dedups by content hash unless `force_rebuild`; assigns the next
    /// version; demotes the superseded record to a delta per the snapshot
    /// policy; flips the latest pointer atomically under the chain lock.
    pub async fn save(&self, request: SaveRequest) -> VersionResult<VersionedRecord> {
        let SaveRequest {
            resource_id,
            kind,
            namespace,
            content,
            config,
            metadata,
            dependencies,
        } = request;
        let namespace = namespace.unwrap_or_else(|| kind.default_namespace());

        let content_value = Value::Object(content.clone());
        let encoded = encode_content(&content_value)?;
        if encoded.size_bytes as u64 > self.settings.max_content_bytes {
            return Err(VersionError::ContentTooLarge {
                size: encoded.size_bytes as u64,
                limit: self.settings.max_content_bytes,
            });
        }

        let lock = self.chain_lock(&resource_id, kind);
        let _guard = lock.lock().await;

        if !config.force_rebuild && encoded.dedup_eligible {
            if let Some(existing) = self.find_duplicate(&resource_id, kind, &encoded.hash).await? {
                debug!(
                    resource_id,
                    kind = %kind,
                    hash = %encoded.hash,
                    "content already exists with same hash, returning existing version"
                );
                return Ok(existing);
            }
        }

        let prev = self.store.find_latest(&resource_id, kind).await?;

        let version = match &config.version {
            Some(version) => {
                if self
                    .store
                    .find_by_version(&resource_id, kind, version)
                    .await?
                    .is_some()
                {
                    return Err(VersionError::ConflictingVersion {
                        resource_id,
                        kind: kind.as_str().to_string(),
                        version: version.clone(),
                    });
                }
                version.clone()
            }
            None => match &prev {
                Some(prev) if config.increment_version => {
                    let mut version = prev.version_info.version.clone();
                    version.patch += 1;
                    version
                }
                _ => Version::new(1, 0, 0),
            },
        };

        let now = Utc::now();
        let id = Uuid::new_v4();

        let inline = encoded.size_bytes < INLINE_CONTENT_MAX || !config.use_cache;
        let (storage_mode, content_inline, content_location) = if inline {
            (StorageMode::Inline, Some(content_value.clone()), None)
        } else {
            let key = generate_cache_key(kind, &resource_id, Some(&version), Some(&encoded.hash));
            self.cache
                .set(namespace, &key, content_value.clone(), config.ttl)
                .await?;
            let location = ContentLocation::in_cache(
                namespace,
                key,
                encoded.size_bytes as u64,
                encoded.hash.clone(),
            );
            (StorageMode::Snapshot, None, Some(location))
        };

        let record = VersionedRecord {
            id,
            resource_id: resource_id.clone(),
            kind,
            namespace,
            version_info: VersionInfo {
                version: version.clone(),
                created_at: now,
                data_hash: encoded.hash.clone(),
                storage_mode,
                is_latest: true,
                supersedes: prev.as_ref().map(|p| p.id),
                superseded_by: None,
                dependencies,
                metadata: Map::new(),
            },
            content_inline,
            content_location,
            ttl: config.ttl,
            metadata,
            created_at: now,
            updated_at: now,
        };

        if let Some(prev) = prev {
            self.demote_superseded(prev, &content, &record).await?;
        }
        self.store.insert(record.clone()).await?;

        if config.use_cache {
            self.cache_latest_record(&record, &config).await;
        }

        info!(resource_id, kind = %kind, version = %version, "saved new version");
        Ok(record)
    }

    async fn find_duplicate(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        hash: &str,
    ) -> VersionResult<Option<VersionedRecord>> {
        if let Some(existing) = self.store.find_by_hash(resource_id, kind, hash).await? {
            return Ok(Some(existing));
        }
        if self.settings.dedup_across_kinds {
            for other in ResourceKind::ALL {
                if other == kind {
                    continue;
                }
                if let Some(existing) = self.store.find_by_hash(resource_id, other, hash).await? {
                    return Ok(Some(existing));
                }
            }
        }
        Ok(None)
    }

    /// Flip the superseded record out of `is_latest` and demote its content
    /// to a backward delta when the snapshot policy allows.
    async fn demote_superseded(
        &self,
        mut prev: VersionedRecord,
        new_content: &Map<String, Value>,
        new_record: &VersionedRecord,
    ) -> VersionResult<()> {
        prev.version_info.is_latest = false;
        prev.version_info.superseded_by = Some(new_record.id);
        prev.updated_at = Utc::now();

        let delta_eligible = self.settings.delta.enabled
            && !should_keep_as_snapshot(prev.version_num(), self.settings.delta.snapshot_interval)
            && prev.version_info.storage_mode != StorageMode::Delta
            && prev.version_info.data_hash != SKIP_LARGE_CONTENT
            && new_record.version_info.data_hash != SKIP_LARGE_CONTENT;

        if delta_eligible {
            match self.load_content_map(&prev).await {
                Ok(prev_content) => {
                    let delta = compute_delta(&prev_content, new_content);
                    let delta_value = to_canonical_value(&delta)?;
                    self.replace_stored_content(&mut prev, delta_value, "delta").await?;
                    prev.version_info.storage_mode = StorageMode::Delta;
                }
                Err(e) => {
                    // Content unavailable (evicted cache entry); keep the
                    // record as a snapshot rather than storing a delta we
                    // could not compute.
                    warn!(
                        resource_id = %prev.resource_id,
                        version = %prev.version_info.version,
                        error = %e,
                        "skipping delta demotion, superseded content unavailable"
                    );
                }
            }
        }

        self.store.update(&prev).await?;
        Ok(())
    }

    /// Overwrite where a record's payload lives (inline or cache) in place.
    async fn replace_stored_content(
        &self,
        record: &mut VersionedRecord,
        payload: Value,
        content_type: &str,
    ) -> VersionResult<()> {
        if let Some(location) = &mut record.content_location {
            let key = location
                .key
                .clone()
                .ok_or_else(|| VersionError::Integrity("content location without key".into()))?;
            let namespace = location.namespace.unwrap_or(record.namespace);
            self.cache.set(namespace, &key, payload, record.ttl).await?;
            location.content_type = content_type.to_string();
        } else {
            record.content_inline = Some(payload);
        }
        Ok(())
    }

    async fn cache_latest_record(&self, record: &VersionedRecord, config: &VersionConfig) {
        let key = generate_cache_key(record.kind, &record.resource_id, None, None);
        match to_canonical_value(record) {
            Ok(value) => {
                if let Err(e) = self
                    .cache
                    .set(record.namespace, &key, value, config.ttl)
                    .await
                {
                    warn!(key, error = %e, "failed to cache latest record");
                }
            }
            Err(e) => warn!(key, error = %e, "failed to serialize record for cache"),
        }
    }

    /// Get the latest version of a resource, content materialized.
    pub async fn get_latest(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        use_cache: bool,
        config: Option<&VersionConfig>,
    ) -> VersionResult<Option<VersionedRecord>> {
        let force_rebuild = config.map(|c| c.force_rebuild).unwrap_or(false);
        if force_rebuild {
            return Ok(None);
        }

        let namespace = kind.default_namespace();
        let cache_key = generate_cache_key(kind, resource_id, None, None);

        if use_cache {
            if let Some(value) = self.cache.get(namespace, &cache_key).await? {
                match serde_json::from_value::<VersionedRecord>((*value).clone()) {
                    Ok(record) => match self.materialize(&record).await {
                        Ok(content) => {
                            let mut record = record;
                            record.content_inline = Some(Value::Object(content));
                            return Ok(Some(record));
                        }
                        Err(e) => {
                            // Stale cache entry racing a chain update; the
                            // store below is authoritative.
                            warn!(cache_key, error = %e, "cached latest record stale, re-reading store");
                        }
                    },
                    Err(e) => {
                        warn!(cache_key, error = %e, "cached latest record failed to deserialize");
                    }
                }
            }
        }

        let record = match self.store.find_latest(resource_id, kind).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let content = self.materialize(&record).await?;
        let mut materialized = record.clone();
        materialized.content_inline = Some(Value::Object(content));

        if use_cache {
            self.cache_latest_record(&record, &VersionConfig::new()).await;
        }
        Ok(Some(materialized))
    }

    /// Get a specific version with content reconstructed from its chain.
    pub async fn get_by_version(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        version: &Version,
    ) -> VersionResult<Option<VersionedRecord>> {
        let record = match self.store.find_by_version(resource_id, kind, version).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let content = self.materialize(&record).await?;
        let mut materialized = record;
        materialized.content_inline = Some(Value::Object(content));
        Ok(Some(materialized))
    }

    /// Version history, newest first.
    pub async fn list_versions(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> VersionResult<Vec<VersionSummary>> {
        let mut records = self.store.list(resource_id, kind).await?;
        records.sort_by(|a, b| {
            b.version_info
                .created_at
                .cmp(&a.version_info.created_at)
                .then_with(|| b.version_info.version.cmp(&a.version_info.version))
        });
        Ok(records.iter().map(VersionSummary::from).collect())
    }

    /// Remove one version and stitch the chain around it.
    ///
    /// The older neighbor is promoted to a full snapshot first when its delta
    /// was computed against the record being removed; if the latest is
    /// removed, its predecessor becomes latest.
    pub async fn delete_version(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        version: &Version,
    ) -> VersionResult<bool> {
        let lock = self.chain_lock(resource_id, kind);
        let _guard = lock.lock().await;

        let record = match self.store.find_by_version(resource_id, kind, version).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        let prev = match record.version_info.supersedes {
            Some(id) => self.store.get(id).await?,
            None => None,
        };
        let next = match record.version_info.superseded_by {
            Some(id) => self.store.get(id).await?,
            None => None,
        };

        // Promote the older neighbor before its reconstruction path vanishes.
        let prev = match prev {
            Some(mut prev) if prev.version_info.storage_mode == StorageMode::Delta => {
                let content = self.materialize(&prev).await?;
                self.replace_stored_content(&mut prev, Value::Object(content), "json")
                    .await?;
                prev.version_info.storage_mode = if prev.content_inline.is_some() {
                    StorageMode::Inline
                } else {
                    StorageMode::Snapshot
                };
                Some(prev)
            }
            other => other,
        };

        if let Some(mut prev) = prev {
            prev.version_info.superseded_by = next.as_ref().map(|n| n.id);
            if record.version_info.is_latest {
                prev.version_info.is_latest = true;
            }
            prev.updated_at = Utc::now();
            self.store.update(&prev).await?;
        }
        if let Some(mut next) = next {
            next.version_info.supersedes = record.version_info.supersedes;
            next.updated_at = Utc::now();
            self.store.update(&next).await?;
        }

        if let Some(location) = &record.content_location {
            if let (Some(namespace), Some(key)) = (location.namespace, location.key.as_deref()) {
                let _ = self.cache.delete(namespace, key).await;
            }
        }
        if record.version_info.is_latest {
            let latest_key = generate_cache_key(kind, resource_id, None, None);
            let _ = self.cache.delete(record.namespace, &latest_key).await;
        }

        let removed = self.store.remove(record.id).await?;
        info!(resource_id, kind = %kind, version = %version, "deleted version");
        Ok(removed)
    }

    /// Create a new version restoring the content of `target_version`.
    ///
    /// History is preserved; the new record carries
    /// `metadata.rollback_from = target_version`.
    pub async fn rollback(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        target_version: &Version,
    ) -> VersionResult<VersionedRecord> {
        let target = self
            .get_by_version(resource_id, kind, target_version)
            .await?
            .ok_or_else(|| VersionError::VersionNotFound {
                resource_id: resource_id.to_string(),
                kind: kind.as_str().to_string(),
                version: target_version.clone(),
            })?;

        let content = target
            .content_inline
            .as_ref()
            .and_then(|v| v.as_object())
            .cloned()
            .ok_or_else(|| VersionError::RollbackUnavailable {
                resource_id: resource_id.to_string(),
                version: target_version.clone(),
            })?;

        let mut metadata = Map::new();
        metadata.insert(
            "rollback_from".to_string(),
            Value::String(target_version.to_string()),
        );

        self.save(
            SaveRequest::new(resource_id, kind, content)
                .with_config(VersionConfig::force_rebuild())
                .with_metadata(metadata),
        )
        .await
    }

    /// Keep only the newest `keep_count` versions; returns how many were
    /// deleted.
    pub async fn cleanup_versions(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        keep_count: usize,
    ) -> VersionResult<usize> {
        let summaries = self.list_versions(resource_id, kind).await?;
        if summaries.len() <= keep_count {
            return Ok(0);
        }

        let mut deleted = 0;
        for summary in &summaries[keep_count..] {
            if self.delete_version(resource_id, kind, &summary.version).await? {
                deleted += 1;
            }
        }
        info!(resource_id, kind = %kind, deleted, "cleaned up old versions");
        Ok(deleted)
    }

    /// Delete every version of a resource; returns how many were removed.
    pub async fn delete_all_versions(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> VersionResult<usize> {
        self.cleanup_versions(resource_id, kind, 0).await
    }

    /// Distinct resource ids stored under a kind.
    pub async fn store_resource_ids(&self, kind: ResourceKind) -> VersionResult<Vec<String>> {
        self.store.list_resource_ids(kind).await
    }

    /// Load a record's full content, reconstructing delta chains.
    pub async fn materialize(&self, record: &VersionedRecord) -> VersionResult<Map<String, Value>> {
        let content = match record.version_info.storage_mode {
            StorageMode::Inline | StorageMode::Snapshot => self.load_content_map(record).await?,
            StorageMode::Delta => self.reconstruct_from_chain(record).await?,
        };

        if record.version_info.data_hash != SKIP_LARGE_CONTENT {
            let actual = content_hash(&Value::Object(content.clone()))?;
            if actual != record.version_info.data_hash {
                return Err(VersionError::HashMismatch {
                    resource_id: record.resource_id.clone(),
                    expected: record.version_info.data_hash.clone(),
                    actual,
                });
            }
        }
        Ok(content)
    }

    /// Raw stored payload (full content for snapshots, the delta for deltas).
    async fn load_stored_payload(&self, record: &VersionedRecord) -> VersionResult<Value> {
        if let Some(inline) = &record.content_inline {
            return Ok(inline.clone());
        }

        let location = record.content_location.as_ref().ok_or_else(|| {
            VersionError::Integrity(format!(
                "record {} has neither inline content nor a location",
                record.id
            ))
        })?;
        let namespace = location.namespace.unwrap_or(record.namespace);
        let key = location
            .key
            .as_deref()
            .ok_or_else(|| VersionError::Integrity("content location without key".into()))?;

        match self.cache.get(namespace, key).await? {
            Some(value) => Ok((*value).clone()),
            None => Err(VersionError::Integrity(format!(
                "content for {} v{} missing from cache",
                record.resource_id, record.version_info.version
            ))),
        }
    }

    async fn load_content_map(&self, record: &VersionedRecord) -> VersionResult<Map<String, Value>> {
        let payload = self.load_stored_payload(record).await?;
        payload
            .as_object()
            .cloned()
            .ok_or_else(|| VersionError::Integrity("stored content is not an object".into()))
    }

    /// Walk forward to the nearest snapshot and apply deltas newest→oldest.
    async fn reconstruct_from_chain(
        &self,
        record: &VersionedRecord,
    ) -> VersionResult<Map<String, Value>> {
        let chain_broken = |detail: String| VersionError::ChainBroken {
            resource_id: record.resource_id.clone(),
            kind: record.kind.as_str().to_string(),
            version: record.version_info.version.clone(),
            detail,
        };

        let mut deltas: Vec<Delta> = Vec::new();
        let mut current = record.clone();

        while current.version_info.storage_mode == StorageMode::Delta {
            if deltas.len() >= self.settings.delta.max_chain_length {
                return Err(chain_broken(format!(
                    "chain exceeds max length {}",
                    self.settings.delta.max_chain_length
                )));
            }

            let payload = self.load_stored_payload(&current).await?;
            let delta: Delta = serde_json::from_value(payload)
                .map_err(|e| chain_broken(format!("stored delta unreadable: {}", e)))?;
            deltas.push(delta);

            let next_id = current
                .version_info
                .superseded_by
                .ok_or_else(|| chain_broken("delta version has no successor".into()))?;
            current = self
                .store
                .get(next_id)
                .await?
                .ok_or_else(|| chain_broken(format!("successor record {} missing", next_id)))?;
        }

        let snapshot = self.load_content_map(&current).await?;

        // Deltas were collected oldest-side first; apply newest→oldest.
        deltas.reverse();
        Ok(reconstruct_version(&snapshot, &deltas)?)
    }
}
