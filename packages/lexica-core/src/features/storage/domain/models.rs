//! Versioned storage domain models.
//!
//! A single tagged record type carries every resource kind; kind-specific
//! metadata travels in the record's metadata map. The version chain is a
//! doubly linked list over record ids (`supersedes` / `superseded_by`) with
//! exactly one `is_latest` record per `(resource_id, kind)`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::features::cache::Namespace;
use crate::features::compression::Compression;

/// Closed enumeration of versioned resource kinds.
///
/// Each kind maps to a fixed cache namespace and metadata schema; there is no
/// dynamic registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dictionary,
    Corpus,
    Language,
    Semantic,
    Literature,
    Trie,
    Search,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Dictionary,
        ResourceKind::Corpus,
        ResourceKind::Language,
        ResourceKind::Semantic,
        ResourceKind::Literature,
        ResourceKind::Trie,
        ResourceKind::Search,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dictionary => "dictionary",
            ResourceKind::Corpus => "corpus",
            ResourceKind::Language => "language",
            ResourceKind::Semantic => "semantic",
            ResourceKind::Literature => "literature",
            ResourceKind::Trie => "trie",
            ResourceKind::Search => "search",
        }
    }

    pub fn parse(name: &str) -> Option<ResourceKind> {
        match name {
            "dictionary" => Some(ResourceKind::Dictionary),
            "corpus" => Some(ResourceKind::Corpus),
            "language" => Some(ResourceKind::Language),
            "semantic" => Some(ResourceKind::Semantic),
            "literature" => Some(ResourceKind::Literature),
            "trie" => Some(ResourceKind::Trie),
            "search" => Some(ResourceKind::Search),
            _ => None,
        }
    }

    /// The cache namespace this kind persists through.
    pub fn default_namespace(&self) -> Namespace {
        match self {
            ResourceKind::Dictionary => Namespace::Dictionary,
            ResourceKind::Corpus => Namespace::Corpus,
            ResourceKind::Language => Namespace::Language,
            ResourceKind::Semantic => Namespace::Semantic,
            ResourceKind::Literature => Namespace::Literature,
            ResourceKind::Trie => Namespace::Trie,
            ResourceKind::Search => Namespace::Search,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a version's content is physically stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Full content inline in the record.
    Inline,

    /// Full content in the cache, referenced by location.
    Snapshot,

    /// Backward delta against the successor version.
    Delta,
}

/// Backend storage types for content location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStorage {
    Cache,
    Disk,
    Database,
    External,
}

/// Where and how a version's bulk content lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentLocation {
    pub storage: ContentStorage,
    pub namespace: Option<Namespace>,
    pub key: Option<String>,
    pub path: Option<String>,
    pub content_type: String,
    pub compression: Compression,
    pub size_bytes: u64,
    pub size_compressed: Option<u64>,

    /// 64-hex SHA-256 of the canonical payload (or the skip marker).
    pub checksum: String,
}

impl ContentLocation {
    pub fn in_cache(namespace: Namespace, key: String, size_bytes: u64, checksum: String) -> Self {
        Self {
            storage: ContentStorage::Cache,
            namespace: Some(namespace),
            key: Some(key),
            path: None,
            content_type: "json".to_string(),
            compression: crate::features::cache::namespace_config(namespace).compression,
            size_bytes,
            size_compressed: None,
            checksum,
        }
    }
}

/// Reference to another versioned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub resource_id: String,
    pub kind: ResourceKind,
}

/// Version metadata for one record in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Semantic version, strictly monotonically increasing within a chain.
    pub version: Version,

    pub created_at: DateTime<Utc>,

    /// 64-hex SHA-256 of the canonical content (or the skip marker).
    pub data_hash: String,

    pub storage_mode: StorageMode,

    /// Exactly one record per `(resource_id, kind)` carries `true`.
    pub is_latest: bool,

    /// Record id of the version this one replaced.
    pub supersedes: Option<Uuid>,

    /// Record id of the version that replaced this one.
    pub superseded_by: Option<Uuid>,

    pub dependencies: Vec<DependencyRef>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One stored version of a resource.
///
/// Immutable after creation except for the latest flip
/// (`is_latest` / `superseded_by`), storage-mode demotion, and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: Uuid,
    pub resource_id: String,
    pub kind: ResourceKind,
    pub namespace: Namespace,
    pub version_info: VersionInfo,
    pub content_inline: Option<Value>,
    pub content_location: Option<ContentLocation>,

    #[serde(default, with = "optional_duration_secs")]
    pub ttl: Option<Duration>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VersionedRecord {
    /// Patch number used by the snapshot policy.
    pub fn version_num(&self) -> u64 {
        self.version_info.version.patch
    }
}

mod optional_duration_secs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

/// Per-call configuration for version management.
#[derive(Debug, Clone)]
pub struct VersionConfig {
    /// Explicit version to assign; collides with an existing record as
    /// `ConflictingVersion`.
    pub version: Option<Version>,

    /// Bump the patch of the current latest instead of reusing `1.0.0`.
    pub increment_version: bool,

    /// Skip dedup and force a new version even for identical content.
    pub force_rebuild: bool,

    /// Persist content and record lookups through the two-tier cache.
    pub use_cache: bool,

    /// TTL override for cached content.
    pub ttl: Option<Duration>,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionConfig {
    pub fn new() -> Self {
        Self {
            version: None,
            increment_version: true,
            force_rebuild: false,
            use_cache: true,
            ttl: None,
        }
    }

    pub fn force_rebuild() -> Self {
        Self {
            force_rebuild: true,
            ..Self::new()
        }
    }
}

/// Lightweight version listing entry, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub data_hash: String,
    pub storage_mode: StorageMode,
    pub is_latest: bool,
}

impl From<&VersionedRecord> for VersionSummary {
    fn from(record: &VersionedRecord) -> Self {
        Self {
            version: record.version_info.version.clone(),
            created_at: record.version_info.created_at,
            data_hash: record.version_info.data_hash.clone(),
            storage_mode: record.version_info.storage_mode,
            is_latest: record.version_info.is_latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_namespace_mapping() {
        assert_eq!(
            ResourceKind::Dictionary.default_namespace(),
            Namespace::Dictionary
        );
        assert_eq!(ResourceKind::Trie.default_namespace(), Namespace::Trie);
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = VersionedRecord {
            id: Uuid::new_v4(),
            resource_id: "hello".to_string(),
            kind: ResourceKind::Dictionary,
            namespace: Namespace::Dictionary,
            version_info: VersionInfo {
                version: Version::new(1, 0, 0),
                created_at: Utc::now(),
                data_hash: "ab".repeat(32),
                storage_mode: StorageMode::Inline,
                is_latest: true,
                supersedes: None,
                superseded_by: None,
                dependencies: vec![],
                metadata: Map::new(),
            },
            content_inline: Some(serde_json::json!({"defs": ["a greeting"]})),
            content_location: None,
            ttl: Some(Duration::from_secs(60)),
            metadata: Map::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["version_info"]["version"], "1.0.0");

        let back: VersionedRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.resource_id, "hello");
        assert_eq!(back.ttl, Some(Duration::from_secs(60)));
        assert_eq!(back.version_info.version, Version::new(1, 0, 0));
    }
}
