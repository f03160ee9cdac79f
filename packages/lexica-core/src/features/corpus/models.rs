//! Corpus model types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusType {
    Lexicon,
    Literature,
    Language,
    Wordlist,
    Custom,
}

impl CorpusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorpusType::Lexicon => "lexicon",
            CorpusType::Literature => "literature",
            CorpusType::Language => "language",
            CorpusType::Wordlist => "wordlist",
            CorpusType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Russian,
    Other,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::French => "french",
            Language::German => "german",
            Language::Spanish => "spanish",
            Language::Italian => "italian",
            Language::Portuguese => "portuguese",
            Language::Russian => "russian",
            Language::Other => "other",
        }
    }
}

/// Outcome of a cascading corpus deletion.
///
/// Failed sub-deletions do not stop the cascade; they are recorded here so
/// the caller can observe a partial delete.
#[derive(Debug, Clone, Default)]
pub struct CascadeDeleteReport {
    /// Resource ids successfully deleted (dependents first).
    pub deleted: Vec<String>,

    /// Human-readable descriptions of failed sub-deletions.
    pub failures: Vec<String>,

    /// Whether the corpus itself was removed.
    pub corpus_deleted: bool,
}

impl CascadeDeleteReport {
    /// The cascade completed but some dependents could not be removed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
