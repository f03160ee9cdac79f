//! Storage port (trait interface).
//!
//! Port/adapter split so the document store backing the version chains can be
//! swapped: in-memory for tests and single-process deployments, a database
//! adapter elsewhere. Bulk content never goes through this port; it lives in
//! the two-tier cache.

use async_trait::async_trait;
use semver::Version;
use uuid::Uuid;

use super::models::{ResourceKind, VersionedRecord};
use crate::features::storage::error::VersionResult;

/// Document store for versioned records, partitioned by kind.
///
/// Implementations must support lookups by `(resource_id, is_latest)`,
/// `(resource_id, version)` and `(resource_id, data_hash)`.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, record: VersionedRecord) -> VersionResult<()>;

    /// Overwrite an existing record (chain flips, demotions).
    async fn update(&self, record: &VersionedRecord) -> VersionResult<()>;

    /// Fetch by record id.
    async fn get(&self, id: Uuid) -> VersionResult<Option<VersionedRecord>>;

    /// The record with `is_latest = true` for the pair, if any.
    async fn find_latest(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> VersionResult<Option<VersionedRecord>>;

    async fn find_by_version(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        version: &Version,
    ) -> VersionResult<Option<VersionedRecord>>;

    /// Dedup lookup by content hash within one `(resource_id, kind)`.
    async fn find_by_hash(
        &self,
        resource_id: &str,
        kind: ResourceKind,
        data_hash: &str,
    ) -> VersionResult<Option<VersionedRecord>>;

    /// All versions for the pair, unordered.
    async fn list(
        &self,
        resource_id: &str,
        kind: ResourceKind,
    ) -> VersionResult<Vec<VersionedRecord>>;

    /// Remove by record id; returns whether a record existed.
    async fn remove(&self, id: Uuid) -> VersionResult<bool>;

    /// Distinct resource ids stored under a kind.
    async fn list_resource_ids(&self, kind: ResourceKind) -> VersionResult<Vec<String>>;

    /// Total record count (all kinds).
    async fn count(&self) -> VersionResult<usize>;
}
