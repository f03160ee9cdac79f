//! Crate-level error aggregation.
//!
//! Each feature owns its error enum; `CoreError` fans them in via `#[from]`
//! so callers that cross feature boundaries can use a single result type.

use thiserror::Error;

use crate::features::cache::CacheError;
use crate::features::codec::CodecError;
use crate::features::delta::DeltaError;
use crate::features::semantic::SemanticError;
use crate::features::storage::VersionError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Semantic index error: {0}")]
    Semantic(#[from] SemanticError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
