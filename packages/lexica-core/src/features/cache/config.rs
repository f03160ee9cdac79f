//! Centralized caching configuration - immutable data structures.
//!
//! Single source of truth for namespace partitions, their memory limits,
//! TTLs, and compression algorithms. Configurations are immutable once
//! registered.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::features::compression::Compression;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Cache namespaces for organized storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Default,
    Dictionary,
    Search,
    Corpus,
    Language,
    Semantic,
    Trie,
    Literature,
    Lexicon,
    Api,
    Openai,
    Scraping,
    Wotd,
}

impl Namespace {
    pub const ALL: [Namespace; 13] = [
        Namespace::Default,
        Namespace::Dictionary,
        Namespace::Search,
        Namespace::Corpus,
        Namespace::Language,
        Namespace::Semantic,
        Namespace::Trie,
        Namespace::Literature,
        Namespace::Lexicon,
        Namespace::Api,
        Namespace::Openai,
        Namespace::Scraping,
        Namespace::Wotd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Default => "default",
            Namespace::Dictionary => "dictionary",
            Namespace::Search => "search",
            Namespace::Corpus => "corpus",
            Namespace::Language => "language",
            Namespace::Semantic => "semantic",
            Namespace::Trie => "trie",
            Namespace::Literature => "literature",
            Namespace::Lexicon => "lexicon",
            Namespace::Api => "api",
            Namespace::Openai => "openai_structured",
            Namespace::Scraping => "scraping",
            Namespace::Wotd => "wotd",
        }
    }

    /// Parse a namespace name, including legacy aliases.
    pub fn parse(name: &str) -> Option<Namespace> {
        match name {
            "default" => Some(Namespace::Default),
            "dictionary" => Some(Namespace::Dictionary),
            "search" => Some(Namespace::Search),
            "corpus" => Some(Namespace::Corpus),
            "language" => Some(Namespace::Language),
            "semantic" => Some(Namespace::Semantic),
            "trie" => Some(Namespace::Trie),
            "literature" => Some(Namespace::Literature),
            "lexicon" => Some(Namespace::Lexicon),
            "api" => Some(Namespace::Api),
            "openai" | "openai_structured" => Some(Namespace::Openai),
            "scraping" => Some(Namespace::Scraping),
            "wotd" => Some(Namespace::Wotd),
            _ => None,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable configuration for a cache namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub namespace: Namespace,

    /// Maximum number of entries in the L1 (memory) cache.
    pub memory_limit: usize,

    /// Time-to-live for L1 cache entries.
    pub memory_ttl: Option<Duration>,

    /// Time-to-live for L2 (disk) cache entries.
    pub disk_ttl: Option<Duration>,

    pub compression: Compression,
}

impl NamespaceConfig {
    fn new(
        namespace: Namespace,
        memory_limit: usize,
        memory_ttl_secs: u64,
        disk_ttl_secs: u64,
        compression: Compression,
    ) -> Self {
        Self {
            namespace,
            memory_limit,
            memory_ttl: Some(Duration::from_secs(memory_ttl_secs)),
            disk_ttl: Some(Duration::from_secs(disk_ttl_secs)),
            compression,
        }
    }
}

/// All 13 namespace configurations - complete coverage, no partial mappings.
pub static DEFAULT_CONFIGS: Lazy<HashMap<Namespace, NamespaceConfig>> = Lazy::new(|| {
    use Compression::{Gzip, Lz4, None as NoComp, Zstd};

    let configs = [
        NamespaceConfig::new(Namespace::Default, 200, 6 * HOUR, DAY, NoComp),
        NamespaceConfig::new(Namespace::Dictionary, 500, 24 * HOUR, 7 * DAY, NoComp),
        NamespaceConfig::new(Namespace::Corpus, 100, 30 * DAY, 90 * DAY, Zstd),
        NamespaceConfig::new(Namespace::Semantic, 5, 7 * DAY, 30 * DAY, Zstd),
        NamespaceConfig::new(Namespace::Search, 300, HOUR, 6 * HOUR, NoComp),
        NamespaceConfig::new(Namespace::Trie, 50, 7 * DAY, 30 * DAY, Lz4),
        NamespaceConfig::new(Namespace::Literature, 50, 30 * DAY, 90 * DAY, Gzip),
        NamespaceConfig::new(Namespace::Scraping, 100, HOUR, 24 * HOUR, Zstd),
        NamespaceConfig::new(Namespace::Api, 100, HOUR, 12 * HOUR, NoComp),
        NamespaceConfig::new(Namespace::Language, 100, 7 * DAY, 30 * DAY, Zstd),
        NamespaceConfig::new(Namespace::Openai, 200, 24 * HOUR, 7 * DAY, Zstd),
        NamespaceConfig::new(Namespace::Lexicon, 100, 7 * DAY, 30 * DAY, NoComp),
        NamespaceConfig::new(Namespace::Wotd, 50, DAY, 7 * DAY, NoComp),
    ];

    configs.into_iter().map(|c| (c.namespace, c)).collect()
});

/// Look up the immutable config for a namespace.
pub fn namespace_config(namespace: Namespace) -> &'static NamespaceConfig {
    DEFAULT_CONFIGS
        .get(&namespace)
        .expect("all namespaces have a default config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_namespaces_configured() {
        for namespace in Namespace::ALL {
            let config = namespace_config(namespace);
            assert!(config.memory_limit > 0);
        }
        assert_eq!(DEFAULT_CONFIGS.len(), 13);
    }

    #[test]
    fn test_parse_round_trip() {
        for namespace in Namespace::ALL {
            assert_eq!(Namespace::parse(namespace.as_str()), Some(namespace));
        }
        assert_eq!(Namespace::parse("openai"), Some(Namespace::Openai));
        assert_eq!(Namespace::parse("compute"), None);
    }

    #[test]
    fn test_known_config_values() {
        let dict = namespace_config(Namespace::Dictionary);
        assert_eq!(dict.memory_limit, 500);
        assert_eq!(dict.memory_ttl, Some(Duration::from_secs(24 * HOUR)));
        assert_eq!(dict.compression, Compression::None);

        let trie = namespace_config(Namespace::Trie);
        assert_eq!(trie.compression, Compression::Lz4);
        assert_eq!(trie.memory_limit, 50);

        let semantic = namespace_config(Namespace::Semantic);
        assert_eq!(semantic.memory_limit, 5);
        assert_eq!(semantic.compression, Compression::Zstd);
    }
}
