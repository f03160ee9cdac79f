//! Trie index: sorted-key prefix structure with frequency-ranked enumeration.
//!
//! Keys are the corpus's sorted normalized vocabulary, so exact match is a
//! binary search and prefix enumeration is a contiguous range scan. The index
//! is versioned alongside its corpus and must be rebuilt when the corpus
//! `vocabulary_hash` changes.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::features::corpus::{normalize, trie_index_resource_id, Corpus};
use crate::features::storage::{
    ResourceKind, SaveRequest, VersionConfig, VersionError, VersionManager, VersionResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieIndex {
    pub corpus_uuid: Uuid,
    pub corpus_name: String,

    /// Hash of the corpus vocabulary this index was built from.
    pub vocabulary_hash: String,

    /// Sorted unique normalized keys.
    pub trie_data: Vec<String>,

    pub word_frequencies: HashMap<String, u64>,

    /// Normalized → preferred original form, only where they differ.
    pub normalized_to_original: HashMap<String, String>,

    pub word_count: usize,
    pub max_frequency: u64,
    pub build_time_ms: u64,
}

impl TrieIndex {
    /// Build the index from a corpus.
    pub fn build_from_corpus(corpus: &Corpus) -> TrieIndex {
        let start = Instant::now();

        let normalized_to_original: HashMap<String, String> = corpus
            .vocabulary
            .iter()
            .filter_map(|word| {
                let original = corpus.original_form(word);
                (original != *word).then(|| (word.clone(), original))
            })
            .collect();

        let max_frequency = corpus.word_frequencies.values().copied().max().unwrap_or(0);

        let index = TrieIndex {
            corpus_uuid: corpus.corpus_uuid,
            corpus_name: corpus.corpus_name.clone(),
            vocabulary_hash: corpus.vocabulary_hash.clone(),
            trie_data: corpus.vocabulary.clone(),
            word_frequencies: corpus.word_frequencies.clone(),
            normalized_to_original,
            word_count: corpus.vocabulary.len(),
            max_frequency,
            build_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            corpus_name = %index.corpus_name,
            words = index.word_count,
            "built trie index"
        );
        index
    }

    /// The corpus vocabulary changed since this index was built.
    pub fn is_stale(&self, corpus: &Corpus) -> bool {
        self.vocabulary_hash != corpus.vocabulary_hash
    }

    /// Preferred display form for a normalized key.
    fn display_form(&self, normalized: &str) -> String {
        self.normalized_to_original
            .get(normalized)
            .cloned()
            .unwrap_or_else(|| normalized.to_string())
    }

    /// Exact membership test; returns the preferred original form on a hit.
    pub fn search_exact(&self, query: &str) -> Option<String> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return None;
        }
        self.trie_data
            .binary_search(&normalized)
            .ok()
            .map(|_| self.display_form(&normalized))
    }

    /// All keys with the given prefix, ranked by frequency descending, then
    /// shorter-first, then lexicographic.
    pub fn search_prefix(&self, prefix: &str, max_results: usize) -> Vec<String> {
        let normalized = normalize(prefix);
        if normalized.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let start = self.trie_data.partition_point(|w| w.as_str() < normalized.as_str());
        let mut matches: Vec<&String> = self.trie_data[start..]
            .iter()
            .take_while(|w| w.starts_with(&normalized))
            .collect();

        matches.sort_by(|a, b| {
            let freq_a = self.word_frequencies.get(*a).copied().unwrap_or(0);
            let freq_b = self.word_frequencies.get(*b).copied().unwrap_or(0);
            freq_b
                .cmp(&freq_a)
                .then_with(|| a.len().cmp(&b.len()))
                .then_with(|| a.cmp(b))
        });

        matches
            .into_iter()
            .take(max_results)
            .map(|w| self.display_form(w))
            .collect()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Versioned persistence
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn save(
        &self,
        manager: &VersionManager,
        config: VersionConfig,
    ) -> VersionResult<()> {
        let content = serde_json::to_value(self)
            .map_err(|e| VersionError::Integrity(format!("trie serialize failed: {}", e)))?
            .as_object()
            .cloned()
            .ok_or_else(|| VersionError::Integrity("trie did not serialize to object".into()))?;

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "corpus_uuid".into(),
            Value::String(self.corpus_uuid.to_string()),
        );
        metadata.insert(
            "vocabulary_hash".into(),
            Value::String(self.vocabulary_hash.clone()),
        );

        manager
            .save(
                SaveRequest::new(
                    trie_index_resource_id(&self.corpus_uuid),
                    ResourceKind::Trie,
                    content,
                )
                .with_config(config)
                .with_metadata(metadata),
            )
            .await?;
        Ok(())
    }

    /// Load the latest stored index for a corpus.
    pub async fn get(
        manager: &VersionManager,
        corpus_uuid: &Uuid,
    ) -> VersionResult<Option<TrieIndex>> {
        let record = manager
            .get_latest(
                &trie_index_resource_id(corpus_uuid),
                ResourceKind::Trie,
                true,
                None,
            )
            .await?;

        match record {
            Some(record) => {
                let content = record
                    .content_inline
                    .ok_or_else(|| VersionError::Integrity("trie record has no content".into()))?;
                let index = serde_json::from_value(content).map_err(|e| {
                    VersionError::Integrity(format!("trie deserialize failed: {}", e))
                })?;
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    /// Load the stored index or (re)build it when absent or stale.
    pub async fn get_or_create(
        manager: &VersionManager,
        corpus: &Corpus,
        config: VersionConfig,
    ) -> VersionResult<TrieIndex> {
        if !config.force_rebuild {
            if let Some(index) = Self::get(manager, &corpus.corpus_uuid).await? {
                if !index.is_stale(corpus) {
                    debug!(corpus_name = %corpus.corpus_name, "reusing stored trie index");
                    return Ok(index);
                }
                debug!(corpus_name = %corpus.corpus_name, "stored trie index stale, rebuilding");
            }
        }

        let index = Self::build_from_corpus(corpus);
        index.save(manager, config).await?;
        Ok(index)
    }

    /// Remove every stored version of the index.
    pub async fn delete(manager: &VersionManager, corpus_uuid: &Uuid) -> VersionResult<bool> {
        let deleted = manager
            .delete_all_versions(&trie_index_resource_id(corpus_uuid), ResourceKind::Trie)
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::corpus::{Language, NoopLemmatizer};

    fn corpus(items: &[&str]) -> Corpus {
        Corpus::create(
            Some("trie-test".into()),
            items.iter().map(|s| s.to_string()).collect(),
            Language::English,
            &NoopLemmatizer,
        )
    }

    #[test]
    fn test_exact_match_returns_original_form() {
        let corpus = corpus(&["café", "cafe", "table"]);
        let index = TrieIndex::build_from_corpus(&corpus);

        assert_eq!(index.search_exact("cafe"), Some("café".to_string()));
        assert_eq!(index.search_exact("CAFE"), Some("café".to_string()));
        assert_eq!(index.search_exact("table"), Some("table".to_string()));
        assert_eq!(index.search_exact("absent"), None);
    }

    #[test]
    fn test_prefix_enumeration_ranked() {
        let mut c = corpus(&["car", "card", "care", "carpet", "dog"]);
        c.word_frequencies.insert("carpet".into(), 100);
        c.word_frequencies.insert("care".into(), 10);
        let index = TrieIndex::build_from_corpus(&c);

        let results = index.search_prefix("car", 10);
        assert_eq!(results[0], "carpet");
        assert_eq!(results[1], "care");
        // Remaining words have no frequency: shorter first
        assert_eq!(results[2], "car");
        assert_eq!(results[3], "card");
    }

    #[test]
    fn test_prefix_no_frequency_shorter_first() {
        let index = TrieIndex::build_from_corpus(&corpus(&["run", "runner", "running", "rust"]));

        let results = index.search_prefix("run", 10);
        assert_eq!(results, vec!["run", "runner", "running"]);
    }

    #[test]
    fn test_prefix_truncation() {
        let index = TrieIndex::build_from_corpus(&corpus(&["aa", "ab", "ac", "ad"]));
        assert_eq!(index.search_prefix("a", 2).len(), 2);
    }

    #[test]
    fn test_staleness() {
        let mut c = corpus(&["apple", "banana"]);
        let index = TrieIndex::build_from_corpus(&c);
        assert!(!index.is_stale(&c));

        c.add_words(&["cherry".to_string()], &NoopLemmatizer);
        assert!(index.is_stale(&c));
    }

    #[test]
    fn test_serde_round_trip() {
        let index = TrieIndex::build_from_corpus(&corpus(&["café", "table"]));
        let value = serde_json::to_value(&index).unwrap();
        let back: TrieIndex = serde_json::from_value(value).unwrap();

        assert_eq!(back.trie_data, index.trie_data);
        assert_eq!(back.search_exact("cafe"), Some("café".to_string()));
    }

    #[tokio::test]
    async fn test_get_or_create_rebuilds_on_hash_change() {
        use crate::features::cache::{CacheManager, CacheSettings, DiskBackend};
        use crate::features::storage::{MemoryVersionStore, VersionManagerSettings};
        use std::sync::Arc;

        let temp = tempfile::TempDir::new().unwrap();
        let backend = DiskBackend::new(temp.path()).unwrap();
        let cache = Arc::new(CacheManager::new(backend, CacheSettings::default()));
        let manager = VersionManager::new(
            Arc::new(MemoryVersionStore::new()),
            cache,
            VersionManagerSettings::default(),
        );

        let mut c = corpus(&["apple", "banana"]);
        let first = TrieIndex::get_or_create(&manager, &c, VersionConfig::new())
            .await
            .unwrap();

        // Unchanged corpus reuses the stored index
        let again = TrieIndex::get_or_create(&manager, &c, VersionConfig::new())
            .await
            .unwrap();
        assert_eq!(again.vocabulary_hash, first.vocabulary_hash);

        // Vocabulary change forces a rebuild
        c.add_words(&["cherry".to_string()], &NoopLemmatizer);
        let rebuilt = TrieIndex::get_or_create(&manager, &c, VersionConfig::new())
            .await
            .unwrap();
        assert_ne!(rebuilt.vocabulary_hash, first.vocabulary_hash);
        assert!(rebuilt.trie_data.contains(&"cherry".to_string()));

        assert!(TrieIndex::delete(&manager, &c.corpus_uuid).await.unwrap());
        assert!(TrieIndex::get(&manager, &c.corpus_uuid).await.unwrap().is_none());
    }
}
