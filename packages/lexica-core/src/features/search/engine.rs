//! Search engine: smart cascade over exact, fuzzy, and semantic methods.
//!
//! Smart mode runs exact first and returns immediately on a hit; otherwise
//! fuzzy, then semantic with an adaptive budget. Results are deduplicated by
//! word with method priority exact > semantic > fuzzy, sorted by score, and
//! truncated. Per-method invocation counters expose the cascade's behavior
//! to instrumentation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::features::corpus::{
    normalize, search_index_resource_id, semantic_index_resource_id, trie_index_resource_id,
    Corpus, Lemmatizer,
};
use crate::features::fuzzy::FuzzySearch;
use crate::features::search::models::{SearchMethod, SearchMode, SearchResult, DEFAULT_MIN_SCORE};
use crate::features::semantic::{Embedder, SemanticIndex, SemanticSearch};
use crate::features::storage::{
    ResourceKind, SaveRequest, VersionConfig, VersionError, VersionManager, VersionResult,
};
use crate::features::trie::TrieIndex;

/// Persisted composite index metadata tying a corpus to its derived indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndex {
    pub corpus_uuid: Uuid,
    pub vocabulary_hash: String,
    pub min_score: f64,
    pub semantic_enabled: bool,
    pub semantic_model: Option<String>,
    pub trie_index_id: Option<String>,
    pub semantic_index_id: Option<String>,
    pub has_trie: bool,
    pub has_fuzzy: bool,
    pub has_semantic: bool,
}

impl SearchIndex {
    pub fn is_stale(&self, corpus: &Corpus) -> bool {
        self.vocabulary_hash != corpus.vocabulary_hash
    }

    pub async fn save(
        &self,
        manager: &VersionManager,
        config: VersionConfig,
    ) -> VersionResult<()> {
        let content = serde_json::to_value(self)
            .map_err(|e| VersionError::Integrity(format!("search index serialize failed: {}", e)))?
            .as_object()
            .cloned()
            .ok_or_else(|| {
                VersionError::Integrity("search index did not serialize to object".into())
            })?;

        let mut metadata = Map::new();
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
                    search_index_resource_id(&self.corpus_uuid),
                    ResourceKind::Search,
                    content,
                )
                .with_config(config)
                .with_metadata(metadata),
            )
            .await?;
        Ok(())
    }

    pub async fn get(
        manager: &VersionManager,
        corpus_uuid: &Uuid,
    ) -> VersionResult<Option<SearchIndex>> {
        let record = manager
            .get_latest(
                &search_index_resource_id(corpus_uuid),
                ResourceKind::Search,
                true,
                None,
            )
            .await?;

        match record {
            Some(record) => {
                let content = record.content_inline.ok_or_else(|| {
                    VersionError::Integrity("search index record has no content".into())
                })?;
                Ok(Some(serde_json::from_value(content).map_err(|e| {
                    VersionError::Integrity(format!("search index deserialize failed: {}", e))
                })?))
            }
            None => Ok(None),
        }
    }

    /// Load or build the composite index, (re)building dependents whose
    /// vocabulary hash no longer matches the corpus.
    pub async fn get_or_create(
        manager: &VersionManager,
        corpus: &Corpus,
        semantic_enabled: bool,
        embedder: &dyn Embedder,
        min_score: f64,
        config: VersionConfig,
    ) -> VersionResult<SearchIndex> {
        if !config.force_rebuild {
            if let Some(index) = Self::get(manager, &corpus.corpus_uuid).await? {
                if !index.is_stale(corpus) && index.semantic_enabled == semantic_enabled {
                    debug!(corpus_name = %corpus.corpus_name, "reusing stored search index");
                    return Ok(index);
                }
                debug!(corpus_name = %corpus.corpus_name, "stored search index stale, rebuilding");
            }
        }

        let trie = TrieIndex::get_or_create(manager, corpus, VersionConfig::new()).await?;

        let semantic_index_id = if semantic_enabled {
            SemanticIndex::get_or_create(manager, corpus, embedder, VersionConfig::new()).await?;
            Some(semantic_index_resource_id(&corpus.corpus_uuid))
        } else {
            None
        };

        let index = SearchIndex {
            corpus_uuid: corpus.corpus_uuid,
            vocabulary_hash: corpus.vocabulary_hash.clone(),
            min_score,
            semantic_enabled,
            semantic_model: semantic_enabled.then(|| embedder.model_name().to_string()),
            trie_index_id: Some(trie_index_resource_id(&corpus.corpus_uuid)),
            semantic_index_id,
            has_trie: true,
            has_fuzzy: true,
            has_semantic: semantic_enabled,
        };
        debug_assert_eq!(trie.vocabulary_hash, index.vocabulary_hash);

        index.save(manager, config).await?;
        Ok(index)
    }

    /// Delete the composite index and its dependent indices.
    pub async fn delete(manager: &VersionManager, corpus_uuid: &Uuid) -> VersionResult<bool> {
        let mut any = TrieIndex::delete(manager, corpus_uuid).await.unwrap_or(false);
        any |= SemanticIndex::delete(manager, corpus_uuid)
            .await
            .unwrap_or(false);
        let deleted = manager
            .delete_all_versions(
                &search_index_resource_id(corpus_uuid),
                ResourceKind::Search,
            )
            .await?;
        Ok(any || deleted > 0)
    }
}

/// Per-method invocation counters.
#[derive(Debug, Default)]
pub struct SearchMetrics {
    exact_calls: AtomicU64,
    fuzzy_calls: AtomicU64,
    semantic_calls: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchMetricsSnapshot {
    pub exact_calls: u64,
    pub fuzzy_calls: u64,
    pub semantic_calls: u64,
}

impl SearchMetrics {
    pub fn snapshot(&self) -> SearchMetricsSnapshot {
        SearchMetricsSnapshot {
            exact_calls: self.exact_calls.load(Ordering::Relaxed),
            fuzzy_calls: self.fuzzy_calls.load(Ordering::Relaxed),
            semantic_calls: self.semantic_calls.load(Ordering::Relaxed),
        }
    }
}

/// Runtime search engine over one corpus.
pub struct SearchEngine {
    corpus: Corpus,
    trie: TrieIndex,
    fuzzy: FuzzySearch,
    semantic: Option<SemanticSearch>,
    lemmatizer: Arc<dyn Lemmatizer>,
    embedder: Arc<dyn Embedder>,
    min_score: f64,
    metrics: SearchMetrics,
}

impl SearchEngine {
    /// Assemble an engine, loading or building every index it needs.
    pub async fn build(
        manager: &VersionManager,
        corpus: Corpus,
        semantic_enabled: bool,
        lemmatizer: Arc<dyn Lemmatizer>,
        embedder: Arc<dyn Embedder>,
        min_score: Option<f64>,
    ) -> VersionResult<SearchEngine> {
        let min_score = min_score.unwrap_or(DEFAULT_MIN_SCORE);

        SearchIndex::get_or_create(
            manager,
            &corpus,
            semantic_enabled,
            embedder.as_ref(),
            min_score,
            VersionConfig::new(),
        )
        .await?;

        let trie = TrieIndex::get_or_create(manager, &corpus, VersionConfig::new()).await?;

        let semantic = if semantic_enabled {
            let index =
                SemanticIndex::get_or_create(manager, &corpus, embedder.as_ref(), VersionConfig::new())
                    .await?;
            match SemanticSearch::new(index) {
                Ok(search) => Some(search),
                Err(e) => {
                    warn!(error = %e, "semantic index failed to load, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Ok(SearchEngine {
            corpus,
            trie,
            fuzzy: FuzzySearch::new(min_score),
            semantic,
            lemmatizer,
            embedder,
            min_score,
            metrics: SearchMetrics::default(),
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn metrics(&self) -> SearchMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Search with explicit mode routing.
    pub fn search(
        &self,
        query: &str,
        mode: SearchMode,
        max_results: usize,
        min_score: Option<f64>,
    ) -> Vec<SearchResult> {
        let normalized = normalize(query);
        if normalized.is_empty() || max_results == 0 {
            return Vec::new();
        }
        let min_score = min_score.unwrap_or(self.min_score);

        match mode {
            SearchMode::Smart => self.smart_cascade(&normalized, max_results, min_score),
            SearchMode::Exact => self.search_exact(&normalized),
            SearchMode::Fuzzy => self.search_fuzzy(&normalized, max_results, min_score),
            SearchMode::Semantic => self.search_semantic(&normalized, max_results, min_score),
        }
    }

    /// Smart-mode convenience.
    pub fn search_smart(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        self.search(query, SearchMode::Smart, max_results, None)
    }

    /// Single best match for word resolution.
    pub fn find_best_match(&self, word: &str) -> Option<SearchResult> {
        self.search(word, SearchMode::Smart, 1, Some(0.0)).into_iter().next()
    }

    fn search_exact(&self, normalized_query: &str) -> Vec<SearchResult> {
        self.metrics.exact_calls.fetch_add(1, Ordering::Relaxed);

        match self.trie.search_exact(normalized_query) {
            Some(word) => vec![SearchResult {
                word,
                lemmatized_word: self.corpus.lemma_of(normalized_query).map(str::to_string),
                score: 1.0,
                method: SearchMethod::Exact,
                language: Some(self.corpus.language),
                metadata: None,
            }],
            None => Vec::new(),
        }
    }

    fn search_fuzzy(&self, normalized_query: &str, max_results: usize, min_score: f64) -> Vec<SearchResult> {
        self.metrics.fuzzy_calls.fetch_add(1, Ordering::Relaxed);
        self.fuzzy.search(
            normalized_query,
            &self.corpus,
            max_results,
            Some(min_score),
            self.lemmatizer.as_ref(),
        )
    }

    fn search_semantic(&self, normalized_query: &str, max_results: usize, min_score: f64) -> Vec<SearchResult> {
        let semantic = match &self.semantic {
            Some(semantic) => semantic,
            None => return Vec::new(),
        };
        self.metrics.semantic_calls.fetch_add(1, Ordering::Relaxed);

        match semantic.search(
            normalized_query,
            &self.corpus,
            max_results,
            min_score,
            self.embedder.as_ref(),
        ) {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "semantic search failed");
                Vec::new()
            }
        }
    }

    /// Sequential cascade with early termination on exact hits and an
    /// adaptive semantic budget.
    fn smart_cascade(&self, normalized_query: &str, max_results: usize, min_score: f64) -> Vec<SearchResult> {
        let exact = self.search_exact(normalized_query);
        if !exact.is_empty() {
            debug!(query = normalized_query, "smart cascade: exact hit, early exit");
            return exact;
        }

        let fuzzy = self.search_fuzzy(normalized_query, max_results, min_score);

        let semantic = if self.semantic.is_some() {
            // Fuzzy already found plenty: be selective with semantic.
            let semantic_limit = if fuzzy.len() >= max_results / 2 {
                max_results / 2
            } else {
                max_results
            };
            self.search_semantic(normalized_query, semantic_limit, min_score)
        } else {
            Vec::new()
        };

        let mut merged: Vec<SearchResult> = fuzzy
            .into_iter()
            .chain(semantic)
            .filter(|r| r.score >= min_score)
            .collect();
        merged = Self::deduplicate(merged);
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(max_results);
        merged
    }

    /// Deduplicate by word: higher-priority method wins, then higher score.
    fn deduplicate(results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut best: Vec<SearchResult> = Vec::new();
        for result in results {
            match best.iter_mut().find(|r| r.word == result.word) {
                Some(existing) => {
                    let replace = result.method.priority() < existing.method.priority()
                        || (result.method.priority() == existing.method.priority()
                            && result.score > existing.score);
                    if replace {
                        *existing = result;
                    }
                }
                None => best.push(result),
            }
        }
        best
    }
}
