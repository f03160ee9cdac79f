//! Namespace-partitioned two-tier cache.
//!
//! - **L1 (memory)**: per-namespace O(1) LRU with TTL expiry
//! - **L2 (disk)**: size-bounded, compressed, restart-safe store
//!
//! Every producer and consumer in the system goes through [`CacheManager`].

pub mod config;
mod disk_backend;
mod error;
mod memory_cache;
mod stats;
mod tiered_cache;

pub use config::{namespace_config, Namespace, NamespaceConfig, DEFAULT_CONFIGS};
pub use disk_backend::{DiskBackend, DiskStats, DEFAULT_SIZE_LIMIT};
pub use error::{CacheError, CacheResult};
pub use memory_cache::NamespaceCache;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tiered_cache::{
    CacheManager, CacheSettings, CacheStatsReport, LoaderError, NamespaceStatsReport,
    DEFAULT_SWEEP_INTERVAL,
};
