//! Fuzzy search over corpus-selected candidate sets.
//!
//! Candidates come from the corpus buckets (lemma, signature, length union);
//! scoring runs a weighted-ratio primary scorer and a token-set secondary
//! scorer on top of the `rapidfuzz` ratio primitive, then applies a length
//! correction. Deterministic given the corpus and inputs.

use std::collections::{BTreeSet, HashSet};

use rapidfuzz::fuzz;
use serde_json::{Map, Value};
use tracing::debug;

use crate::features::corpus::{Corpus, Lemmatizer};
use crate::features::search::models::{SearchMethod, SearchResult, DEFAULT_MIN_SCORE};

/// Fallback sample size for large corpora with no candidate hits.
const FALLBACK_SAMPLE_SIZE: usize = 1000;

/// Plain similarity ratio in `[0, 100]`.
fn ratio(a: &str, b: &str) -> f64 {
    fuzz::ratio(a.chars(), b.chars()) * 100.0
}

/// Best alignment of the shorter string inside the longer one.
fn best_window_ratio(shorter: &str, longer: &str) -> f64 {
    let short_chars: Vec<char> = shorter.chars().collect();
    let long_chars: Vec<char> = longer.chars().collect();
    if short_chars.is_empty() || short_chars.len() > long_chars.len() {
        return ratio(shorter, longer);
    }

    let window = short_chars.len();
    let mut best: f64 = 0.0;
    for start in 0..=(long_chars.len() - window) {
        let slice: String = long_chars[start..start + window].iter().collect();
        best = best.max(ratio(shorter, &slice));
    }
    best
}

/// Weighted-ratio primary scorer in `[0, 100]`.
///
/// Plain ratio, upgraded with a damped partial-alignment score when the
/// candidate and query lengths diverge enough that whole-string comparison
/// under-scores substrings.
pub fn weighted_ratio(query: &str, candidate: &str) -> f64 {
    let base = ratio(query, candidate);

    let query_len = query.chars().count().max(1);
    let candidate_len = candidate.chars().count().max(1);
    let (short, long) = if query_len <= candidate_len {
        (query, candidate)
    } else {
        (candidate, query)
    };
    let len_ratio = long.chars().count() as f64 / short.chars().count().max(1) as f64;

    if len_ratio > 1.5 {
        base.max(best_window_ratio(short, long) * 0.9)
    } else {
        base
    }
}

/// Token-set scorer in `[0, 100]`: order-insensitive word overlap.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sect = intersection.join(" ");
    let sect_a = if only_a.is_empty() {
        sect.clone()
    } else if sect.is_empty() {
        only_a.join(" ")
    } else {
        format!("{} {}", sect, only_a.join(" "))
    };
    let sect_b = if only_b.is_empty() {
        sect.clone()
    } else if sect.is_empty() {
        only_b.join(" ")
    } else {
        format!("{} {}", sect, only_b.join(" "))
    };

    ratio(&sect, &sect_a)
        .max(ratio(&sect, &sect_b))
        .max(ratio(&sect_a, &sect_b))
}

/// Length-based score correction.
///
/// Phrases are exempt; for single words the score decays with the relative
/// length difference so "cat" does not outrank "cart" for "carts".
pub fn apply_length_correction(
    query: &str,
    candidate: &str,
    score: f64,
    is_query_phrase: bool,
    is_candidate_phrase: bool,
) -> f64 {
    if is_query_phrase || is_candidate_phrase {
        return score;
    }

    let query_len = query.chars().count();
    let candidate_len = candidate.chars().count();
    let diff = query_len.abs_diff(candidate_len);
    if diff == 0 {
        return score;
    }

    let max_len = query_len.max(candidate_len).max(1);
    let penalty = (diff as f64 / max_len as f64) * 0.3;
    (score * (1.0 - penalty)).max(0.0)
}

/// Fuzzy search engine over a corpus.
#[derive(Debug, Clone)]
pub struct FuzzySearch {
    pub min_score: f64,
}

impl Default for FuzzySearch {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl FuzzySearch {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    /// Deterministic frequency-weighted sample: the highest-frequency words
    /// first, ties broken by vocabulary order.
    fn frequency_weighted_sample(corpus: &Corpus, sample_size: usize) -> Vec<String> {
        let mut indexed: Vec<(usize, &String)> = corpus.vocabulary.iter().enumerate().collect();
        indexed.sort_by_key(|(idx, word)| {
            let freq = corpus.word_frequencies.get(*word).copied().unwrap_or(1);
            (std::cmp::Reverse(freq), *idx)
        });
        indexed
            .into_iter()
            .take(sample_size)
            .map(|(_, word)| word.clone())
            .collect()
    }

    fn candidate_vocabulary(
        &self,
        query: &str,
        corpus: &Corpus,
        max_candidates: usize,
        lemmatizer: &dyn Lemmatizer,
    ) -> Vec<String> {
        let candidates =
            corpus.get_candidates(&query.to_lowercase(), max_candidates, true, true, 2, lemmatizer);
        let mut vocabulary = corpus.get_words_by_indices(&candidates);

        // Multi-word queries: union candidates of each token.
        if vocabulary.is_empty() && query.contains(' ') {
            let mut union: Vec<usize> = Vec::new();
            let mut seen: HashSet<usize> = HashSet::new();
            for token in query.split_whitespace() {
                for idx in corpus.get_candidates(
                    &token.to_lowercase(),
                    max_candidates / 2,
                    true,
                    true,
                    2,
                    lemmatizer,
                ) {
                    if seen.insert(idx) {
                        union.push(idx);
                    }
                }
            }
            vocabulary = corpus.get_words_by_indices(&union);
        }

        if vocabulary.is_empty() {
            vocabulary = if corpus.vocabulary.len() <= FALLBACK_SAMPLE_SIZE {
                corpus.vocabulary.clone()
            } else {
                debug!(
                    corpus_name = %corpus.corpus_name,
                    "no candidates, falling back to frequency-weighted sample"
                );
                Self::frequency_weighted_sample(corpus, FALLBACK_SAMPLE_SIZE)
            };
        }
        vocabulary
    }

    /// Fuzzy search with candidate pre-selection and two-scorer ranking.
    pub fn search(
        &self,
        query: &str,
        corpus: &Corpus,
        max_results: usize,
        min_score: Option<f64>,
        lemmatizer: &dyn Lemmatizer,
    ) -> Vec<SearchResult> {
        let threshold = min_score.unwrap_or(self.min_score);
        if query.trim().is_empty() || max_results == 0 {
            return Vec::new();
        }

        let vocabulary =
            self.candidate_vocabulary(query, corpus, max_results * 40, lemmatizer);
        if vocabulary.is_empty() {
            return Vec::new();
        }

        let normalized_query = query.to_lowercase();
        let is_phrase = normalized_query.contains(' ');
        let limit_multiplier = if vocabulary.len() > 200 { 5 } else { 3 };
        let limit = max_results * limit_multiplier;

        // Primary scorer: weighted ratio. Cutoffs are on the 0..100 scale,
        // loosened for phrases to tolerate word-order noise.
        let primary_cutoff = threshold * if is_phrase { 45.0 } else { 50.0 };
        let mut primary: Vec<(&String, f64)> = vocabulary
            .iter()
            .map(|word| (word, weighted_ratio(&normalized_query, word)))
            .filter(|(_, score)| *score >= primary_cutoff)
            .collect();
        primary.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        primary.truncate(limit);

        let mut seen: HashSet<&String> = HashSet::new();
        let mut matches: Vec<(&String, f64, bool)> = Vec::new();
        for (word, score) in primary {
            if seen.insert(word) {
                matches.push((word, score / 100.0, false));
            }
        }

        // Secondary scorer: token-set ratio, boosted ×1.2 capped at 1.0.
        if is_phrase || normalized_query.chars().count() >= 8 {
            let secondary_cutoff = threshold * if is_phrase { 35.0 } else { 45.0 };
            let mut secondary: Vec<(&String, f64)> = vocabulary
                .iter()
                .map(|word| (word, token_set_ratio(&normalized_query, word)))
                .filter(|(_, score)| *score >= secondary_cutoff)
                .collect();
            secondary.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            secondary.truncate(limit);

            for (word, score) in secondary {
                if seen.insert(word) {
                    let boosted = (score / 100.0 * 1.2).min(1.0);
                    matches.push((word, boosted, true));
                }
            }
        }

        let mut results: Vec<SearchResult> = matches
            .into_iter()
            .filter_map(|(word, base_score, secondary)| {
                let corrected = apply_length_correction(
                    &normalized_query,
                    word,
                    base_score,
                    is_phrase,
                    word.contains(' '),
                );
                if corrected < threshold {
                    return None;
                }

                let metadata = secondary.then(|| {
                    let mut m = Map::new();
                    m.insert("scoring_method".into(), Value::String("secondary".into()));
                    m
                });

                Some(SearchResult {
                    word: corpus.original_form(word),
                    lemmatized_word: corpus.lemma_of(word).map(str::to_string),
                    score: corrected,
                    method: SearchMethod::Fuzzy,
                    language: Some(corpus.language),
                    metadata,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(max_results);
        results
    }
}
