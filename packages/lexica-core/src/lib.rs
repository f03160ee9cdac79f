/*
 * Lexica Core - Versioned Two-Tier Cache for Dictionary/Corpus Search
 *
 * Feature-First Architecture:
 * - shared/      : Core context, crate-level errors
 * - features/    : Vertical slices (codec → compression → delta → cache →
 *                  storage → corpus → trie/fuzzy/semantic → search)
 *
 * Subsystems:
 * - Versioned Resource Manager: dedup by content hash, monotonic version
 *   chains, backward-delta compression, atomic latest-pointer updates
 * - Two-Tier Cache: per-namespace LRU+TTL over a compressed disk store
 * - Derived-Index Lifecycle: Corpus → SearchIndex → {Trie, Semantic} with
 *   cascading invalidation and deletes
 */

pub mod features;
pub mod shared;

pub use features::cache::{
    CacheError, CacheManager, CacheResult, CacheSettings, CacheStatsSnapshot, DiskBackend,
    Namespace, NamespaceConfig,
};
pub use features::codec::{canonical_bytes, content_hash, CodecError, SKIP_LARGE_CONTENT};
pub use features::compression::{Compression, Compressor};
pub use features::corpus::{
    CascadeDeleteReport, Corpus, CorpusType, Language, Lemmatizer, NoopLemmatizer,
};
pub use features::delta::{
    apply_delta, compute_delta, compute_diff_between, reconstruct_version, Delta, DeltaConfig,
    DeltaError,
};
pub use features::fuzzy::FuzzySearch;
pub use features::search::{
    SearchEngine, SearchIndex, SearchMethod, SearchMode, SearchResult, DEFAULT_MIN_SCORE,
};
pub use features::semantic::{Embedder, HashEmbedder, IndexKind, SemanticIndex, SemanticSearch};
pub use features::storage::{
    ResourceKind, SaveRequest, StorageMode, VersionConfig, VersionError, VersionManager,
    VersionManagerSettings, VersionResult, VersionStore, VersionedRecord,
};
pub use features::trie::TrieIndex;
pub use shared::{CoreContext, CoreError, CoreResult};
