//! Content codec: canonical JSON encoding and SHA-256 content addressing.
//!
//! Canonical form is UTF-8 JSON with lexicographically sorted object keys and
//! no insignificant whitespace; numbers use the shortest round-trip form.
//! `serde_json` provides all of this directly: its `Map` is backed by a
//! `BTreeMap` (sorted keys) and `to_vec` emits compact output.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Checksum marker for payloads too large to hash eagerly.
///
/// Records carrying this marker are never dedup-eligible.
pub const SKIP_LARGE_CONTENT: &str = "skip-large-content";

/// Encoded size above which full hashing is deferred.
pub const LARGE_CONTENT_THRESHOLD: usize = 256 * 1024;

/// Reserved top-level key that marks embedded opaque payloads.
pub const BINARY_DATA_KEY: &str = "binary_data";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Cannot encode value as canonical JSON: {0}")]
    Encode(String),

    #[error("Cannot decode canonical JSON: {0}")]
    Decode(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Canonically encoded content with its identity.
#[derive(Debug, Clone)]
pub struct EncodedContent {
    /// Canonical UTF-8 JSON bytes.
    pub bytes: Vec<u8>,

    /// 64-hex SHA-256 of `bytes`, or [`SKIP_LARGE_CONTENT`].
    pub hash: String,

    /// Encoded size in bytes (exact, even when hashing was skipped).
    pub size_bytes: usize,

    /// False when the hash is the skip marker.
    pub dedup_eligible: bool,
}

/// Encode a JSON value to canonical bytes.
pub fn canonical_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Convert any serializable type into a canonical JSON value.
///
/// Going through `Value` forces object keys into sorted order regardless of
/// the struct's field order.
pub fn to_canonical_value<T: Serialize>(value: &T) -> CodecResult<Value> {
    serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Parse canonical bytes back into a JSON value.
pub fn from_canonical_bytes(bytes: &[u8]) -> CodecResult<Value> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// 64-hex SHA-256 of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Encode and address a content value.
///
/// Payloads at or above [`LARGE_CONTENT_THRESHOLD`], or objects carrying a
/// top-level [`BINARY_DATA_KEY`], get the skip marker instead of a real hash
/// and are excluded from deduplication.
pub fn encode_content(value: &Value) -> CodecResult<EncodedContent> {
    let bytes = canonical_bytes(value)?;
    let size_bytes = bytes.len();

    let has_binary = value
        .as_object()
        .map(|m| m.contains_key(BINARY_DATA_KEY))
        .unwrap_or(false);

    if size_bytes >= LARGE_CONTENT_THRESHOLD || has_binary {
        return Ok(EncodedContent {
            bytes,
            hash: SKIP_LARGE_CONTENT.to_string(),
            size_bytes,
            dedup_eligible: false,
        });
    }

    let hash = hash_bytes(&bytes);
    Ok(EncodedContent {
        bytes,
        hash,
        size_bytes,
        dedup_eligible: true,
    })
}

/// Hash a content value, honoring the large-payload skip rule.
pub fn content_hash(value: &Value) -> CodecResult<String> {
    Ok(encode_content(value)?.hash)
}
