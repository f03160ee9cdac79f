//! Error types for versioned storage.

use semver::Version;
use thiserror::Error;

use crate::features::cache::CacheError;
use crate::features::codec::CodecError;
use crate::features::delta::DeltaError;

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("Version {version} not found for {kind}:{resource_id}")]
    VersionNotFound {
        resource_id: String,
        kind: String,
        version: Version,
    },

    #[error("Version {version} already exists for {kind}:{resource_id}")]
    ConflictingVersion {
        resource_id: String,
        kind: String,
        version: Version,
    },

    #[error("Delta chain broken for {kind}:{resource_id} at version {version}: {detail}")]
    ChainBroken {
        resource_id: String,
        kind: String,
        version: Version,
        detail: String,
    },

    #[error("Content hash mismatch for {resource_id}: expected {expected}, got {actual}")]
    HashMismatch {
        resource_id: String,
        expected: String,
        actual: String,
    },

    #[error("Content too large: {size} bytes exceeds limit {limit}")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("Version {version} of {resource_id} has no content to restore")]
    RollbackUnavailable { resource_id: String, version: Version },

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Delta error: {0}")]
    Delta(#[from] DeltaError),
}

pub type VersionResult<T> = Result<T, VersionError>;
