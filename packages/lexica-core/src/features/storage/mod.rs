//! Versioned resource storage.
//!
//! Append-only version chains with content deduplication, delta compression
//! of superseded versions, and atomic latest-pointer updates. Bulk content
//! persists through the two-tier cache; chain metadata lives behind the
//! [`VersionStore`] port.
//!
//! [`VersionStore`]: domain::ports::VersionStore

pub mod api;
pub mod domain;
mod error;
pub mod infrastructure;

pub use api::registry::{kind_spec, resolve_kind, KindSpec};
pub use api::version_manager::{
    generate_cache_key, SaveRequest, VersionManager, VersionManagerSettings,
    DEFAULT_MAX_CONTENT_BYTES, INLINE_CONTENT_MAX,
};
pub use api::versions::{
    error_status, rollback_to_version, version_content, version_diff, version_history,
    VersionContent, VersionDiff, VersionHistory,
};
pub use domain::models::{
    ContentLocation, ContentStorage, DependencyRef, ResourceKind, StorageMode, VersionConfig,
    VersionInfo, VersionSummary, VersionedRecord,
};
pub use domain::ports::VersionStore;
pub use error::{VersionError, VersionResult};
pub use infrastructure::memory_store::MemoryVersionStore;
