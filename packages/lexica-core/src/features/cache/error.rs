//! Error types for the cache system.

use thiserror::Error;

use crate::features::codec::CodecError;
use crate::features::compression::CompressionError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("Encode error in namespace {namespace}: {detail}")]
    Encode { namespace: String, detail: String },

    #[error("Decode error ({kind}) in namespace {namespace}: {detail}")]
    Decode {
        kind: String,
        namespace: String,
        detail: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache corrupted: {0}")]
    Corruption(String),

    #[error("Content too large: {size} bytes exceeds limit {limit}")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
