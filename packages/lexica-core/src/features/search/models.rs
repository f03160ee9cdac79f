//! Search result and mode types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::features::corpus::Language;

/// Default minimum score threshold for search results.
pub const DEFAULT_MIN_SCORE: f64 = 0.6;

/// How a result was found. Order encodes dedup priority:
/// exact beats semantic beats fuzzy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Exact,
    Semantic,
    Fuzzy,
}

impl SearchMethod {
    /// Lower value wins when deduplicating by word.
    pub fn priority(&self) -> u8 {
        match self {
            SearchMethod::Exact => 0,
            SearchMethod::Semantic => 1,
            SearchMethod::Fuzzy => 2,
        }
    }
}

/// Search routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Exact → fuzzy → semantic cascade with early termination.
    Smart,
    Exact,
    Fuzzy,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Preferred original (diacritic-bearing) form.
    pub word: String,

    pub lemmatized_word: Option<String>,

    /// Similarity in `[0, 1]`.
    pub score: f64,

    pub method: SearchMethod,
    pub language: Option<Language>,
    pub metadata: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_priority_order() {
        assert!(SearchMethod::Exact.priority() < SearchMethod::Semantic.priority());
        assert!(SearchMethod::Semantic.priority() < SearchMethod::Fuzzy.priority());
    }
}
