//! Core corpus implementation with in-memory vocabulary data.
//!
//! A corpus owns the sorted normalized vocabulary, the mapping back to the
//! original (diacritic-bearing) forms, lemma maps, and the signature/length
//! buckets that drive fuzzy candidate selection. Identity is a stable uuid;
//! the human name may change.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::features::corpus::models::{CascadeDeleteReport, CorpusType, Language};
use crate::features::corpus::normalize::{
    batch_normalize, has_diacritics, normalize, vocabulary_hash, word_signature, Lemmatizer,
};
use crate::features::storage::{
    ResourceKind, SaveRequest, VersionConfig, VersionError, VersionManager, VersionResult,
    VersionedRecord,
};

/// Version-manager resource id of a corpus.
pub fn corpus_resource_id(corpus_uuid: &Uuid) -> String {
    corpus_uuid.to_string()
}

/// Resource id of the composite search index derived from a corpus.
pub fn search_index_resource_id(corpus_uuid: &Uuid) -> String {
    format!("{}:search", corpus_uuid)
}

/// Resource id of the trie index derived from a corpus.
pub fn trie_index_resource_id(corpus_uuid: &Uuid) -> String {
    format!("{}:trie", corpus_uuid)
}

/// Resource id of the semantic index derived from a corpus.
pub fn semantic_index_resource_id(corpus_uuid: &Uuid) -> String {
    format!("{}:semantic", corpus_uuid)
}

fn name_alias_key(corpus_name: &str) -> String {
    format!("corpus_name:{}", corpus_name)
}

/// A corpus of vocabulary with search-supporting derived structures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    /// Stable identity; never changes across versions.
    pub corpus_uuid: Uuid,

    /// Human name; renameable, the uuid stays authoritative.
    pub corpus_name: String,

    pub corpus_type: CorpusType,
    pub language: Language,

    /// Sorted unique normalized vocabulary.
    pub vocabulary: Vec<String>,

    /// Original forms, pre-normalization, diacritics preserved.
    pub original_vocabulary: Vec<String>,

    /// Normalized index → original indices, preferred (diacritic) form first.
    pub normalized_to_original_indices: BTreeMap<usize, Vec<usize>>,

    pub vocabulary_to_index: HashMap<String, usize>,

    /// Unique lemmas in first-seen order.
    pub lemmatized_vocabulary: Vec<String>,
    pub word_to_lemma_indices: BTreeMap<usize, usize>,
    pub lemma_to_word_indices: BTreeMap<usize, Vec<usize>>,

    /// Phonetic signature → sorted word indices.
    pub signature_buckets: BTreeMap<String, Vec<usize>>,

    /// Word length → sorted word indices.
    pub length_buckets: BTreeMap<usize, Vec<usize>>,

    pub word_frequencies: HashMap<String, u64>,

    /// Stable hash of the sorted normalized vocabulary; index staleness is
    /// detected by comparing against this.
    pub vocabulary_hash: String,

    pub parent_corpus_id: Option<Uuid>,
    pub child_corpus_ids: Vec<Uuid>,
    pub is_master: bool,

    pub unique_word_count: usize,
    pub total_word_count: usize,
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Corpus {
    /// Build a corpus from raw vocabulary.
    ///
    /// Normalizes, sorts and dedups the vocabulary, builds the
    /// original-form mapping with diacritic preference, lemma maps via the
    /// injected lemmatizer, and the signature/length buckets.
    pub fn create(
        corpus_name: Option<String>,
        vocabulary: Vec<String>,
        language: Language,
        lemmatizer: &dyn Lemmatizer,
    ) -> Corpus {
        let corpus_uuid = Uuid::new_v4();
        let corpus_name = corpus_name.unwrap_or_else(|| generated_name(&corpus_uuid));
        info!(
            corpus_name = %corpus_name,
            words = vocabulary.len(),
            "creating corpus"
        );

        let mut corpus = Corpus {
            corpus_uuid,
            corpus_name,
            corpus_type: CorpusType::Lexicon,
            language,
            vocabulary: Vec::new(),
            original_vocabulary: vocabulary,
            normalized_to_original_indices: BTreeMap::new(),
            vocabulary_to_index: HashMap::new(),
            lemmatized_vocabulary: Vec::new(),
            word_to_lemma_indices: BTreeMap::new(),
            lemma_to_word_indices: BTreeMap::new(),
            signature_buckets: BTreeMap::new(),
            length_buckets: BTreeMap::new(),
            word_frequencies: HashMap::new(),
            vocabulary_hash: String::new(),
            parent_corpus_id: None,
            child_corpus_ids: Vec::new(),
            is_master: false,
            unique_word_count: 0,
            total_word_count: 0,
            last_updated: Utc::now(),
            metadata: Map::new(),
        };

        corpus.rebuild_indices(lemmatizer);
        corpus
    }

    /// Rebuild every derived structure from `original_vocabulary`.
    fn rebuild_indices(&mut self, lemmatizer: &dyn Lemmatizer) {
        let normalized = batch_normalize(&self.original_vocabulary);

        let unique: Vec<String> = {
            let mut set: Vec<String> = normalized
                .iter()
                .filter(|w| !w.is_empty())
                .cloned()
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            set.sort();
            set
        };

        self.vocabulary_to_index = unique
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        self.vocabulary = unique;

        // Map sorted vocabulary indices back to original positions, then
        // order each list so diacritic-bearing forms come first.
        self.normalized_to_original_indices.clear();
        for (orig_idx, norm_word) in normalized.iter().enumerate() {
            if let Some(&sorted_idx) = self.vocabulary_to_index.get(norm_word) {
                self.normalized_to_original_indices
                    .entry(sorted_idx)
                    .or_default()
                    .push(orig_idx);
            }
        }
        for indices in self.normalized_to_original_indices.values_mut() {
            if indices.len() > 1 {
                indices.sort_by_key(|&idx| (!has_diacritics(&self.original_vocabulary[idx]), idx));
            }
        }

        self.build_lemma_maps(lemmatizer);
        self.build_signature_index();

        self.unique_word_count = self.vocabulary.len();
        self.total_word_count = self.original_vocabulary.len();
        self.vocabulary_hash = vocabulary_hash(&self.vocabulary, None);
        self.last_updated = Utc::now();

        debug!(
            corpus_name = %self.corpus_name,
            unique = self.unique_word_count,
            lemmas = self.lemmatized_vocabulary.len(),
            "rebuilt corpus indices"
        );
    }

    fn build_lemma_maps(&mut self, lemmatizer: &dyn Lemmatizer) {
        self.lemmatized_vocabulary.clear();
        self.word_to_lemma_indices.clear();
        self.lemma_to_word_indices.clear();

        let lemmas = lemmatizer.lemmatize_batch(&self.vocabulary);

        let mut lemma_to_idx: HashMap<String, usize> = HashMap::new();
        for lemma in &lemmas {
            if !lemma_to_idx.contains_key(lemma) {
                lemma_to_idx.insert(lemma.clone(), self.lemmatized_vocabulary.len());
                self.lemmatized_vocabulary.push(lemma.clone());
            }
        }

        for (word_idx, lemma) in lemmas.iter().enumerate() {
            let lemma_idx = lemma_to_idx[lemma];
            self.word_to_lemma_indices.insert(word_idx, lemma_idx);
            self.lemma_to_word_indices
                .entry(lemma_idx)
                .or_default()
                .push(word_idx);
        }
    }

    fn build_signature_index(&mut self) {
        self.signature_buckets.clear();
        self.length_buckets.clear();

        for (idx, word) in self.vocabulary.iter().enumerate() {
            let signature = word_signature(word);
            if !signature.is_empty() {
                self.signature_buckets.entry(signature).or_default().push(idx);
            }
            self.length_buckets
                .entry(word.chars().count())
                .or_default()
                .push(idx);
        }

        for bucket in self.signature_buckets.values_mut() {
            bucket.sort_unstable();
        }
        for bucket in self.length_buckets.values_mut() {
            bucket.sort_unstable();
        }
    }

    /// Add words incrementally; returns the number of new unique words.
    pub fn add_words(&mut self, words: &[String], lemmatizer: &dyn Lemmatizer) -> usize {
        if words.is_empty() {
            return 0;
        }

        let before = self.vocabulary.len();
        self.original_vocabulary.extend_from_slice(words);

        for word in batch_normalize(words) {
            if !word.is_empty() {
                *self.word_frequencies.entry(word).or_insert(0) += 1;
            }
        }

        self.rebuild_indices(lemmatizer);
        let added = self.vocabulary.len() - before;
        info!(corpus_name = %self.corpus_name, added, "added words to corpus");
        added
    }

    /// Remove words incrementally; returns the number of unique words removed.
    pub fn remove_words(&mut self, words: &[String], lemmatizer: &dyn Lemmatizer) -> usize {
        if words.is_empty() {
            return 0;
        }

        let remove: HashSet<String> = batch_normalize(words).into_iter().collect();
        let before = self.vocabulary.len();

        let normalized_orig = batch_normalize(&self.original_vocabulary);
        self.original_vocabulary = self
            .original_vocabulary
            .iter()
            .zip(normalized_orig.iter())
            .filter(|(_, norm)| !remove.contains(*norm))
            .map(|(orig, _)| orig.clone())
            .collect();

        for word in &remove {
            self.word_frequencies.remove(word);
        }

        self.rebuild_indices(lemmatizer);
        let removed = before - self.vocabulary.len();
        info!(corpus_name = %self.corpus_name, removed, "removed words from corpus");
        removed
    }

    pub fn get_word_by_index(&self, index: usize) -> Option<&str> {
        self.vocabulary.get(index).map(String::as_str)
    }

    /// Original form of a word by normalized index.
    ///
    /// When several original forms normalize to the same word, the preferred
    /// (diacritic-bearing) form comes back.
    pub fn get_original_word_by_index(&self, normalized_index: usize) -> Option<&str> {
        if let Some(indices) = self.normalized_to_original_indices.get(&normalized_index) {
            if let Some(&first) = indices.first() {
                return self.original_vocabulary.get(first).map(String::as_str);
            }
        }
        self.get_word_by_index(normalized_index)
    }

    pub fn get_words_by_indices(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&idx| self.get_word_by_index(idx))
            .map(str::to_string)
            .collect()
    }

    pub fn get_original_words_by_indices(&self, normalized_indices: &[usize]) -> Vec<String> {
        normalized_indices
            .iter()
            .filter_map(|&idx| self.get_original_word_by_index(idx))
            .map(str::to_string)
            .collect()
    }

    /// Preferred original form of a normalized word, falling back to the
    /// normalized form itself.
    pub fn original_form(&self, normalized_word: &str) -> String {
        self.vocabulary_to_index
            .get(normalized_word)
            .and_then(|&idx| self.get_original_word_by_index(idx))
            .unwrap_or(normalized_word)
            .to_string()
    }

    /// Lemma of a normalized word, when known.
    pub fn lemma_of(&self, normalized_word: &str) -> Option<&str> {
        let word_idx = *self.vocabulary_to_index.get(normalized_word)?;
        let lemma_idx = *self.word_to_lemma_indices.get(&word_idx)?;
        self.lemmatized_vocabulary.get(lemma_idx).map(String::as_str)
    }

    /// Candidate word indices for a query.
    ///
    /// Union of direct lookup, lemma-class siblings, signature-bucket members
    /// and length-window members, in that order, truncated to `max_results`.
    pub fn get_candidates(
        &self,
        query: &str,
        max_results: usize,
        use_lemmas: bool,
        use_signatures: bool,
        length_tolerance: usize,
        lemmatizer: &dyn Lemmatizer,
    ) -> Vec<usize> {
        let normalized_query = normalize(query);
        if normalized_query.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<usize> = Vec::new();
        let mut seen: HashSet<usize> = HashSet::new();
        let push = |idx: usize, candidates: &mut Vec<usize>, seen: &mut HashSet<usize>| {
            if seen.insert(idx) {
                candidates.push(idx);
            }
        };

        // 1. Direct lookup
        if let Some(&idx) = self.vocabulary_to_index.get(&normalized_query) {
            push(idx, &mut candidates, &mut seen);
            if candidates.len() >= max_results {
                return candidates;
            }
        }

        // 2. Lemma-class siblings
        if use_lemmas && !self.lemmatized_vocabulary.is_empty() {
            let query_lemma = lemmatizer.lemmatize(&normalized_query);
            if let Some(lemma_idx) = self
                .lemmatized_vocabulary
                .iter()
                .position(|lemma| *lemma == query_lemma)
            {
                if let Some(word_indices) = self.lemma_to_word_indices.get(&lemma_idx) {
                    for &idx in word_indices {
                        push(idx, &mut candidates, &mut seen);
                        if candidates.len() >= max_results {
                            return candidates;
                        }
                    }
                }
            }
        }

        // 3. Signature-bucket members
        if use_signatures {
            let signature = word_signature(&normalized_query);
            if let Some(bucket) = self.signature_buckets.get(&signature) {
                for &idx in bucket {
                    push(idx, &mut candidates, &mut seen);
                    if candidates.len() >= max_results {
                        return candidates;
                    }
                }
            }
        }

        // 4. Length-window members
        let query_len = normalized_query.chars().count();
        for diff in 0..=length_tolerance {
            let lengths = if diff == 0 {
                vec![query_len]
            } else {
                vec![query_len.saturating_sub(diff), query_len + diff]
            };
            for length in lengths {
                if length == 0 {
                    continue;
                }
                if let Some(bucket) = self.length_buckets.get(&length) {
                    for &idx in bucket {
                        push(idx, &mut candidates, &mut seen);
                        if candidates.len() >= max_results {
                            return candidates;
                        }
                    }
                }
            }
        }

        candidates
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Versioned persistence
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn persistence_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("corpus_name".into(), Value::String(self.corpus_name.clone()));
        metadata.insert(
            "corpus_type".into(),
            Value::String(self.corpus_type.as_str().to_string()),
        );
        metadata.insert(
            "language".into(),
            Value::String(self.language.as_str().to_string()),
        );
        metadata.insert(
            "vocabulary_hash".into(),
            Value::String(self.vocabulary_hash.clone()),
        );
        metadata.insert(
            "vocabulary_size".into(),
            Value::Number(self.unique_word_count.into()),
        );
        metadata
    }

    /// Save through the version manager (kind Corpus, namespace Corpus).
    pub async fn save(
        &self,
        manager: &VersionManager,
        config: VersionConfig,
    ) -> VersionResult<VersionedRecord> {
        let content = serde_json::to_value(self)
            .map_err(|e| VersionError::Integrity(format!("corpus serialize failed: {}", e)))?
            .as_object()
            .cloned()
            .ok_or_else(|| VersionError::Integrity("corpus did not serialize to object".into()))?;

        let record = manager
            .save(
                SaveRequest::new(
                    corpus_resource_id(&self.corpus_uuid),
                    ResourceKind::Corpus,
                    content,
                )
                .with_config(config)
                .with_metadata(self.persistence_metadata()),
            )
            .await?;

        // Name alias so lookups by human name resolve to the uuid.
        let alias = serde_json::json!({ "corpus_uuid": self.corpus_uuid });
        if let Err(e) = manager
            .cache()
            .set(
                crate::features::cache::Namespace::Corpus,
                &name_alias_key(&self.corpus_name),
                alias,
                None,
            )
            .await
        {
            warn!(corpus_name = %self.corpus_name, error = %e, "failed to cache corpus name alias");
        }

        Ok(record)
    }

    fn from_record(record: &VersionedRecord) -> VersionResult<Corpus> {
        let content = record
            .content_inline
            .clone()
            .ok_or_else(|| VersionError::Integrity("corpus record has no content".into()))?;
        serde_json::from_value(content)
            .map_err(|e| VersionError::Integrity(format!("corpus deserialize failed: {}", e)))
    }

    /// Load the latest version of a corpus by uuid.
    pub async fn get(
        manager: &VersionManager,
        corpus_uuid: &Uuid,
        config: Option<&VersionConfig>,
    ) -> VersionResult<Option<Corpus>> {
        let record = manager
            .get_latest(
                &corpus_resource_id(corpus_uuid),
                ResourceKind::Corpus,
                config.map(|c| c.use_cache).unwrap_or(true),
                config,
            )
            .await?;
        record.as_ref().map(Corpus::from_record).transpose()
    }

    /// Load a corpus by human name (alias cache first, then a scan).
    pub async fn get_by_name(
        manager: &VersionManager,
        corpus_name: &str,
    ) -> VersionResult<Option<Corpus>> {
        let alias = manager
            .cache()
            .get(
                crate::features::cache::Namespace::Corpus,
                &name_alias_key(corpus_name),
            )
            .await?;
        if let Some(alias) = alias {
            if let Some(uuid) = alias
                .get("corpus_uuid")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                if let Some(corpus) = Self::get(manager, &uuid, None).await? {
                    return Ok(Some(corpus));
                }
            }
        }

        // Alias miss: scan stored corpora.
        for resource_id in manager.store_resource_ids(ResourceKind::Corpus).await? {
            if let Some(record) = manager
                .get_latest(&resource_id, ResourceKind::Corpus, false, None)
                .await?
            {
                if record.metadata.get("corpus_name").and_then(Value::as_str) == Some(corpus_name) {
                    return Ok(Some(Corpus::from_record(&record)?));
                }
            }
        }
        Ok(None)
    }

    /// Load an existing corpus by uuid or name, or create and save a new one.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_create(
        manager: &VersionManager,
        corpus_uuid: Option<&Uuid>,
        corpus_name: Option<&str>,
        vocabulary: Vec<String>,
        language: Language,
        corpus_type: CorpusType,
        lemmatizer: &dyn Lemmatizer,
        config: VersionConfig,
    ) -> VersionResult<Corpus> {
        if let Some(uuid) = corpus_uuid {
            if let Some(existing) = Self::get(manager, uuid, Some(&config)).await? {
                return Ok(existing);
            }
        }
        if let Some(name) = corpus_name {
            if let Some(existing) = Self::get_by_name(manager, name).await? {
                return Ok(existing);
            }
        }

        let mut corpus = Corpus::create(
            corpus_name.map(str::to_string),
            vocabulary,
            language,
            lemmatizer,
        );
        corpus.corpus_type = corpus_type;
        corpus.save(manager, config).await?;
        Ok(corpus)
    }

    /// Batch load by uuid; absent ids are skipped.
    pub async fn get_many_by_ids(
        manager: &VersionManager,
        corpus_uuids: &[Uuid],
    ) -> VersionResult<Vec<Corpus>> {
        let mut result = Vec::with_capacity(corpus_uuids.len());
        for uuid in corpus_uuids {
            if let Some(corpus) = Self::get(manager, uuid, None).await? {
                result.push(corpus);
            }
        }
        Ok(result)
    }

    /// Cascading delete: dependent indices first, then the corpus.
    ///
    /// Failures in dependent deletions are recorded and do not stop the
    /// cascade; the report tells the caller whether the delete was partial.
    pub async fn delete(
        manager: &VersionManager,
        corpus_uuid: &Uuid,
    ) -> VersionResult<CascadeDeleteReport> {
        let mut report = CascadeDeleteReport::default();
        let search_id = search_index_resource_id(corpus_uuid);

        // Resolve dependent index ids from the search index record when it
        // exists; fall back to the deterministic ids.
        let mut trie_id = trie_index_resource_id(corpus_uuid);
        let mut semantic_id = semantic_index_resource_id(corpus_uuid);
        match manager
            .get_latest(&search_id, ResourceKind::Search, false, None)
            .await
        {
            Ok(Some(record)) => {
                if let Some(content) = record.content_inline.as_ref().and_then(Value::as_object) {
                    if let Some(id) = content.get("trie_index_id").and_then(Value::as_str) {
                        trie_id = id.to_string();
                    }
                    if let Some(id) = content.get("semantic_index_id").and_then(Value::as_str) {
                        semantic_id = id.to_string();
                    }
                }
            }
            Ok(None) => {}
            Err(e) => report
                .failures
                .push(format!("search index lookup failed: {}", e)),
        }

        for (resource_id, kind) in [
            (trie_id, ResourceKind::Trie),
            (semantic_id, ResourceKind::Semantic),
            (search_id, ResourceKind::Search),
        ] {
            match manager.delete_all_versions(&resource_id, kind).await {
                Ok(0) => {}
                Ok(_) => report.deleted.push(resource_id),
                Err(e) => report
                    .failures
                    .push(format!("failed to delete {}: {}", resource_id, e)),
            }
        }

        let corpus_id = corpus_resource_id(corpus_uuid);
        match manager
            .delete_all_versions(&corpus_id, ResourceKind::Corpus)
            .await
        {
            Ok(n) => {
                report.corpus_deleted = n > 0;
                if n > 0 {
                    report.deleted.push(corpus_id);
                }
            }
            Err(e) => report
                .failures
                .push(format!("failed to delete corpus {}: {}", corpus_id, e)),
        }

        if report.is_partial() {
            warn!(
                corpus_uuid = %corpus_uuid,
                failures = report.failures.len(),
                "cascading corpus delete completed partially"
            );
        } else {
            info!(corpus_uuid = %corpus_uuid, "cascading corpus delete completed");
        }
        Ok(report)
    }
}

fn generated_name(corpus_uuid: &Uuid) -> String {
    let hex = corpus_uuid.simple().to_string();
    format!("corpus-{}", &hex[..8])
}
