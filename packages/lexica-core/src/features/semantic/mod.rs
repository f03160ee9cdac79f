//! Semantic index: dense-vector store with ANN search.
//!
//! Embeddings cover the corpus's lemmatized vocabulary; search encodes the
//! query, retrieves by L2, converts distance to similarity (`1 − d/2`), and
//! maps embedding index → lemma → preferred original word. The persisted form
//! captures the trained index bytes plus the vocabulary mapping so a reload
//! reproduces identical results without re-embedding.

pub mod embedder;
pub mod index;

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::features::corpus::{normalize, semantic_index_resource_id, Corpus};
use crate::features::search::models::{SearchMethod, SearchResult};
use crate::features::storage::{
    ResourceKind, SaveRequest, VersionConfig, VersionError, VersionManager, VersionResult,
};

pub use embedder::{l2_normalize, Embedder, HashEmbedder, MIN_BATCH_SIZE};
pub use index::{ivf_nlist, ivf_nprobe, select_index_kind, IndexKind, VectorIndex};

#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot build an index over an empty vocabulary")]
    EmptyIndex,

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Index serialization failed: {0}")]
    Serialization(String),
}

mod base64_bytes {
    use super::{Engine, BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Persisted semantic index for one corpus and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticIndex {
    pub corpus_uuid: Uuid,

    /// Corpus vocabulary hash at build time; staleness marker.
    pub vocabulary_hash: String,

    pub model_name: String,
    pub embedding_dimension: usize,

    /// Always equals `lemmatized_vocabulary.len()`.
    pub num_embeddings: usize,

    pub index_type: IndexKind,
    pub index_params: Map<String, Value>,

    /// Trained index + embeddings, bincode-encoded.
    #[serde(with = "base64_bytes")]
    pub index_data: Vec<u8>,

    /// Corpus vocabulary snapshot (normalized).
    pub vocabulary: Vec<String>,

    /// Embedding order: one vector per lemma.
    pub lemmatized_vocabulary: Vec<String>,

    /// Lemma index → embedding index.
    pub lemma_to_embeddings: HashMap<usize, usize>,
}

impl SemanticIndex {
    /// Encode the corpus's lemmas and train an index sized to the vocabulary.
    pub fn build(corpus: &Corpus, embedder: &dyn Embedder) -> Result<SemanticIndex, SemanticError> {
        let lemmas = &corpus.lemmatized_vocabulary;
        if lemmas.is_empty() {
            return Err(SemanticError::EmptyIndex);
        }

        let dim = embedder.dimension();
        let batch_size = embedder.batch_size().max(MIN_BATCH_SIZE);

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(lemmas.len());
        for batch in lemmas.chunks(batch_size) {
            let mut encoded = embedder.embed_batch(batch)?;
            for v in &mut encoded {
                if v.len() != dim {
                    return Err(SemanticError::DimensionMismatch {
                        expected: dim,
                        actual: v.len(),
                    });
                }
                l2_normalize(v);
            }
            vectors.extend(encoded);
        }

        let kind = select_index_kind(vectors.len());
        let index = VectorIndex::build(kind, &vectors, dim)?;
        let index_data =
            bincode::serialize(&index).map_err(|e| SemanticError::Serialization(e.to_string()))?;

        let mut index_params = Map::new();
        if matches!(kind, IndexKind::IvfPq | IndexKind::OpqIvfPq) {
            let nlist = ivf_nlist(vectors.len());
            index_params.insert("nlist".into(), Value::Number(nlist.into()));
            index_params.insert("nprobe".into(), Value::Number(ivf_nprobe(nlist).into()));
            index_params.insert(
                "opq".into(),
                Value::Bool(kind == IndexKind::OpqIvfPq),
            );
        }

        info!(
            corpus_name = %corpus.corpus_name,
            model = embedder.model_name(),
            embeddings = vectors.len(),
            index_type = kind.as_str(),
            "built semantic index"
        );

        Ok(SemanticIndex {
            corpus_uuid: corpus.corpus_uuid,
            vocabulary_hash: corpus.vocabulary_hash.clone(),
            model_name: embedder.model_name().to_string(),
            embedding_dimension: dim,
            num_embeddings: vectors.len(),
            index_type: kind,
            index_params,
            index_data,
            vocabulary: corpus.vocabulary.clone(),
            lemmatized_vocabulary: lemmas.clone(),
            lemma_to_embeddings: (0..lemmas.len()).map(|i| (i, i)).collect(),
        })
    }

    pub fn is_stale(&self, corpus: &Corpus) -> bool {
        self.vocabulary_hash != corpus.vocabulary_hash
    }

    /// Decode the trained index for searching.
    pub fn load_index(&self) -> Result<VectorIndex, SemanticError> {
        bincode::deserialize(&self.index_data)
            .map_err(|e| SemanticError::Serialization(e.to_string()))
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
            .map_err(|e| VersionError::Integrity(format!("semantic serialize failed: {}", e)))?
            .as_object()
            .cloned()
            .ok_or_else(|| {
                VersionError::Integrity("semantic index did not serialize to object".into())
            })?;

        let mut metadata = Map::new();
        metadata.insert(
            "corpus_uuid".into(),
            Value::String(self.corpus_uuid.to_string()),
        );
        metadata.insert("model_name".into(), Value::String(self.model_name.clone()));
        metadata.insert(
            "vocabulary_hash".into(),
            Value::String(self.vocabulary_hash.clone()),
        );

        manager
            .save(
                SaveRequest::new(
                    semantic_index_resource_id(&self.corpus_uuid),
                    ResourceKind::Semantic,
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
    ) -> VersionResult<Option<SemanticIndex>> {
        let record = manager
            .get_latest(
                &semantic_index_resource_id(corpus_uuid),
                ResourceKind::Semantic,
                true,
                None,
            )
            .await?;

        match record {
            Some(record) => {
                let content = record.content_inline.ok_or_else(|| {
                    VersionError::Integrity("semantic record has no content".into())
                })?;
                let index = serde_json::from_value(content).map_err(|e| {
                    VersionError::Integrity(format!("semantic deserialize failed: {}", e))
                })?;
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    /// Load the stored index or (re)build when absent, stale, or built by a
    /// different model.
    pub async fn get_or_create(
        manager: &VersionManager,
        corpus: &Corpus,
        embedder: &dyn Embedder,
        config: VersionConfig,
    ) -> VersionResult<SemanticIndex> {
        if !config.force_rebuild {
            if let Some(index) = Self::get(manager, &corpus.corpus_uuid).await? {
                if !index.is_stale(corpus) && index.model_name == embedder.model_name() {
                    debug!(corpus_name = %corpus.corpus_name, "reusing stored semantic index");
                    return Ok(index);
                }
                debug!(
                    corpus_name = %corpus.corpus_name,
                    "stored semantic index stale, rebuilding"
                );
            }
        }

        let index = Self::build(corpus, embedder)
            .map_err(|e| VersionError::Integrity(format!("semantic build failed: {}", e)))?;
        index.save(manager, config).await?;
        Ok(index)
    }

    pub async fn delete(manager: &VersionManager, corpus_uuid: &Uuid) -> VersionResult<bool> {
        let deleted = manager
            .delete_all_versions(
                &semantic_index_resource_id(corpus_uuid),
                ResourceKind::Semantic,
            )
            .await?;
        Ok(deleted > 0)
    }
}

/// Runtime semantic search over a loaded index.
pub struct SemanticSearch {
    index: SemanticIndex,
    vectors: VectorIndex,
}

impl SemanticSearch {
    pub fn new(index: SemanticIndex) -> Result<SemanticSearch, SemanticError> {
        let vectors = index.load_index()?;
        Ok(SemanticSearch { index, vectors })
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Semantic similarity search.
    ///
    /// Pure over the loaded index: retrieves `2 × max_results` nearest by L2,
    /// converts to similarity, filters, and maps embeddings back through the
    /// corpus to preferred original forms.
    pub fn search(
        &self,
        query: &str,
        corpus: &Corpus,
        max_results: usize,
        min_score: f64,
        embedder: &dyn Embedder,
    ) -> Result<Vec<SearchResult>, SemanticError> {
        let normalized = normalize(query);
        if normalized.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let mut query_vector = embedder.embed(&normalized)?;
        l2_normalize(&mut query_vector);

        let hits = self.vectors.search(&query_vector, max_results * 2)?;

        let mut results = Vec::new();
        for (embedding_idx, distance) in hits {
            // Squared L2 between unit vectors is in [0, 4]; 1 − d/2 is cosine.
            let similarity = 1.0 - (distance as f64) / 2.0;
            if similarity < min_score {
                continue;
            }

            let lemma_idx = embedding_idx as usize;
            let lemma = match self.index.lemmatized_vocabulary.get(lemma_idx) {
                Some(lemma) => lemma,
                None => continue,
            };

            let word = corpus
                .lemma_to_word_indices
                .get(&lemma_idx)
                .and_then(|indices| indices.first())
                .and_then(|&idx| corpus.get_original_word_by_index(idx))
                .unwrap_or(lemma.as_str())
                .to_string();

            results.push(SearchResult {
                word,
                lemmatized_word: Some(lemma.clone()),
                score: similarity,
                method: SearchMethod::Semantic,
                language: Some(corpus.language),
                metadata: None,
            });

            if results.len() >= max_results {
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::corpus::{Language, NoopLemmatizer};

    fn corpus(items: &[&str]) -> Corpus {
        Corpus::create(
            Some("semantic-test".into()),
            items.iter().map(|s| s.to_string()).collect(),
            Language::English,
            &NoopLemmatizer,
        )
    }

    #[test]
    fn test_build_invariants() {
        let corpus = corpus(&["apple", "application", "banana"]);
        let embedder = HashEmbedder::new(64);
        let index = SemanticIndex::build(&corpus, &embedder).unwrap();

        assert_eq!(index.num_embeddings, index.lemmatized_vocabulary.len());
        assert_eq!(index.embedding_dimension, 64);
        assert_eq!(index.index_type, IndexKind::Flat);
        assert_eq!(index.vocabulary_hash, corpus.vocabulary_hash);
    }

    #[test]
    fn test_empty_vocabulary_rejected() {
        let corpus = corpus(&[]);
        let embedder = HashEmbedder::new(32);
        assert!(matches!(
            SemanticIndex::build(&corpus, &embedder),
            Err(SemanticError::EmptyIndex)
        ));
    }

    #[test]
    fn test_search_finds_exact_lemma() {
        let c = corpus(&["apple", "application", "banana", "cherry"]);
        let embedder = HashEmbedder::new(128);
        let index = SemanticIndex::build(&c, &embedder).unwrap();
        let search = SemanticSearch::new(index).unwrap();

        let results = search.search("apple", &c, 5, 0.0, &embedder).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].word, "apple");
        assert!(results[0].score > 0.99);
        assert_eq!(results[0].method, SearchMethod::Semantic);
    }

    #[test]
    fn test_min_score_filter() {
        let c = corpus(&["apple", "banana"]);
        let embedder = HashEmbedder::new(128);
        let search = SemanticSearch::new(SemanticIndex::build(&c, &embedder).unwrap()).unwrap();

        // A threshold just below exact-match similarity keeps only the
        // identical word.
        let results = search.search("apple", &c, 5, 0.95, &embedder).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].word, "apple");
    }

    #[test]
    fn test_reload_reproduces_results() {
        let c = corpus(&["alpha", "beta", "gamma", "delta", "epsilon"]);
        let embedder = HashEmbedder::new(64);
        let index = SemanticIndex::build(&c, &embedder).unwrap();

        let value = serde_json::to_value(&index).unwrap();
        let reloaded: SemanticIndex = serde_json::from_value(value).unwrap();

        let a = SemanticSearch::new(index).unwrap();
        let b = SemanticSearch::new(reloaded).unwrap();

        let ra = a.search("beta", &c, 5, 0.0, &embedder).unwrap();
        let rb = b.search("beta", &c, 5, 0.0, &embedder).unwrap();
        let words_a: Vec<&str> = ra.iter().map(|r| r.word.as_str()).collect();
        let words_b: Vec<&str> = rb.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words_a, words_b);
    }

    #[test]
    fn test_diacritic_form_in_results() {
        let c = corpus(&["café", "table"]);
        let embedder = HashEmbedder::new(128);
        let search = SemanticSearch::new(SemanticIndex::build(&c, &embedder).unwrap()).unwrap();

        let results = search.search("cafe", &c, 5, 0.5, &embedder).unwrap();
        assert_eq!(results[0].word, "café");
    }

    #[test]
    fn test_staleness() {
        let mut c = corpus(&["apple", "banana"]);
        let embedder = HashEmbedder::new(32);
        let index = SemanticIndex::build(&c, &embedder).unwrap();
        assert!(!index.is_stale(&c));

        c.add_words(&["cherry".to_string()], &NoopLemmatizer);
        assert!(index.is_stale(&c));
    }
}
