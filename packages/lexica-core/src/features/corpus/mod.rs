//! Corpus: vocabulary, original-form mapping, lemma maps, candidate buckets.

mod core;
mod models;
pub mod normalize;

pub use self::core::{
    corpus_resource_id, search_index_resource_id, semantic_index_resource_id,
    trie_index_resource_id, Corpus,
};
pub use models::{CascadeDeleteReport, CorpusType, Language};
pub use normalize::{
    batch_normalize, has_diacritics, normalize, vocabulary_hash, word_signature, Lemmatizer,
    NoopLemmatizer,
};
