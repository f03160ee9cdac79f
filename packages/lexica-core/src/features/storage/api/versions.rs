//! Version history surface consumed by HTTP handlers.
//!
//! Pure core functions: history listing, version content, categorized diff,
//! and rollback. Error kinds map onto the external status codes (absent
//! resource → 404, semantically invalid input → 422).

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::features::delta::{compute_diff_between, ContentDiff};
use crate::features::storage::api::version_manager::VersionManager;
use crate::features::storage::domain::models::{ResourceKind, StorageMode, VersionSummary};
use crate::features::storage::error::{VersionError, VersionResult};

/// Full version history of a resource, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistory {
    pub resource_id: String,
    pub total_versions: usize,
    pub versions: Vec<VersionSummary>,
}

/// One materialized historical version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionContent {
    pub resource_id: String,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub data_hash: String,
    pub storage_mode: StorageMode,
    pub is_latest: bool,
    pub content: Value,
}

/// Categorized diff between two versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub resource_id: String,
    pub from_version: Version,
    pub to_version: Version,
    pub diff: ContentDiff,
}

/// Map a version-surface error onto the external status-code contract:
/// missing resources are 404, semantically invalid inputs 422, backend and
/// integrity faults 500.
pub fn error_status(error: &VersionError) -> u16 {
    match error {
        VersionError::VersionNotFound { .. } => 404,
        VersionError::RollbackUnavailable { .. }
        | VersionError::ConflictingVersion { .. }
        | VersionError::UnknownKind(_) => 422,
        _ => 500,
    }
}

/// List all versions of a resource, newest first.
///
/// `VersionNotFound` (with the zero version) when no history exists.
pub async fn version_history(
    manager: &VersionManager,
    resource_id: &str,
    kind: ResourceKind,
) -> VersionResult<VersionHistory> {
    let versions = manager.list_versions(resource_id, kind).await?;
    if versions.is_empty() {
        return Err(VersionError::VersionNotFound {
            resource_id: resource_id.to_string(),
            kind: kind.as_str().to_string(),
            version: Version::new(0, 0, 0),
        });
    }

    Ok(VersionHistory {
        resource_id: resource_id.to_string(),
        total_versions: versions.len(),
        versions,
    })
}

/// Materialize one historical version.
pub async fn version_content(
    manager: &VersionManager,
    resource_id: &str,
    kind: ResourceKind,
    version: &Version,
) -> VersionResult<VersionContent> {
    let record = manager
        .get_by_version(resource_id, kind, version)
        .await?
        .ok_or_else(|| VersionError::VersionNotFound {
            resource_id: resource_id.to_string(),
            kind: kind.as_str().to_string(),
            version: version.clone(),
        })?;

    Ok(VersionContent {
        resource_id: resource_id.to_string(),
        version: record.version_info.version.clone(),
        created_at: record.version_info.created_at,
        data_hash: record.version_info.data_hash.clone(),
        storage_mode: record.version_info.storage_mode,
        is_latest: record.version_info.is_latest,
        content: record.content_inline.unwrap_or(Value::Null),
    })
}

/// Categorized diff between two versions (`from` older, `to` newer).
pub async fn version_diff(
    manager: &VersionManager,
    resource_id: &str,
    kind: ResourceKind,
    from: &Version,
    to: &Version,
) -> VersionResult<VersionDiff> {
    let from_content = version_content(manager, resource_id, kind, from).await?;
    let to_content = version_content(manager, resource_id, kind, to).await?;

    let empty = serde_json::Map::new();
    let a = from_content.content.as_object().unwrap_or(&empty);
    let b = to_content.content.as_object().unwrap_or(&empty);

    Ok(VersionDiff {
        resource_id: resource_id.to_string(),
        from_version: from.clone(),
        to_version: to.clone(),
        diff: compute_diff_between(a, b),
    })
}

/// Roll a resource back to a previous version.
///
/// Produces a new version whose content equals the target's and whose
/// metadata records `rollback_from`. A target with no restorable content is
/// a `RollbackUnavailable` (422) failure.
pub async fn rollback_to_version(
    manager: &VersionManager,
    resource_id: &str,
    kind: ResourceKind,
    version: &Version,
) -> VersionResult<VersionContent> {
    let record = manager.rollback(resource_id, kind, version).await?;

    Ok(VersionContent {
        resource_id: resource_id.to_string(),
        version: record.version_info.version.clone(),
        created_at: record.version_info.created_at,
        data_hash: record.version_info.data_hash.clone(),
        storage_mode: record.version_info.storage_mode,
        is_latest: record.version_info.is_latest,
        content: record.content_inline.unwrap_or(Value::Null),
    })
}
