//! Text normalization contracts for corpus processing.
//!
//! Normalization lowercases, strips diacritics via NFD decomposition, and
//! collapses whitespace, so "café" and "cafe" share one vocabulary slot.
//! Lemmatization is an injected trait; the core never implements a real
//! lemmatizer itself.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Normalize a string for search: lowercase, strip diacritics, collapse
/// whitespace.
///
/// 1. NFD normalize (decompose characters into base + combining marks)
/// 2. Filter out combining marks
/// 3. Lowercase
/// 4. Collapse whitespace
pub fn normalize(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a batch, dropping entries that normalize to nothing.
pub fn batch_normalize(words: &[String]) -> Vec<String> {
    words.iter().map(|w| normalize(w)).collect()
}

/// Check if a character is a combining mark (diacritic).
fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}' |  // Combining Diacritical Marks
        '\u{1DC0}'..='\u{1DFF}' |  // Combining Diacritical Marks Supplement
        '\u{20D0}'..='\u{20FF}' |  // Combining Diacritical Marks for Symbols
        '\u{FE20}'..='\u{FE2F}'    // Combining Half Marks
    )
}

/// Check if a word carries any non-ASCII character (diacritic-bearing form).
pub fn has_diacritics(word: &str) -> bool {
    word.chars().any(|c| !c.is_ascii())
}

/// Generate a phonetic signature for a word.
///
/// Simplified representation for grouping similar-sounding words:
/// alphabetic characters only, ph→f, ck→k, doubled consonants squeezed,
/// vowels dropped after the first character, truncated to 6 characters.
pub fn word_signature(word: &str) -> String {
    let signature: String = word
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect();

    if signature.is_empty() {
        return String::new();
    }

    let signature = signature.replace("ph", "f").replace("ck", "k");

    let mut squeezed = String::with_capacity(signature.len());
    let mut prev = '\0';
    for c in signature.chars() {
        if c != prev || "aeiou".contains(c) {
            squeezed.push(c);
        }
        prev = c;
    }

    let mut chars = squeezed.chars();
    let result = match chars.next() {
        Some(first) => {
            let rest: String = chars.filter(|c| !"aeiou".contains(*c)).collect();
            let mut s = String::with_capacity(rest.len() + 1);
            s.push(first);
            s.push_str(&rest);
            s
        }
        None => return String::new(),
    };

    result.chars().take(6).collect()
}

/// Stable short hash of a sorted normalized vocabulary.
///
/// Samples the whole vocabulary when it has at most 20 words, else the first
/// 10 plus last 10, and prefixes the embedding model name when supplied so
/// different models never share cache entries.
pub fn vocabulary_hash(sorted_vocabulary: &[String], model_name: Option<&str>) -> String {
    let len = sorted_vocabulary.len();
    let sample_size = len.min(20);

    let sample: Vec<&str> = if len > sample_size {
        let half = sample_size / 2;
        sorted_vocabulary[..half]
            .iter()
            .chain(sorted_vocabulary[len - half..].iter())
            .map(String::as_str)
            .collect()
    } else {
        sorted_vocabulary.iter().map(String::as_str).collect()
    };

    let model_prefix = model_name.map(|m| format!("{}:", m)).unwrap_or_default();
    let content = format!("{}{}:{}", model_prefix, len, sample.join("|"));

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Lemmatization contract consumed by the corpus.
///
/// Real implementations live outside the core; [`NoopLemmatizer`] maps every
/// word to itself.
pub trait Lemmatizer: Send + Sync {
    fn lemmatize(&self, word: &str) -> String;

    fn lemmatize_batch(&self, words: &[String]) -> Vec<String> {
        words.iter().map(|w| self.lemmatize(w)).collect()
    }
}

/// Identity lemmatizer: every word is its own lemma.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLemmatizer;

impl Lemmatizer for NoopLemmatizer {
    fn lemmatize(&self, word: &str) -> String {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_diacritics() {
        assert_eq!(normalize("café"), "cafe");
        assert_eq!(normalize("naïve"), "naive");
        assert_eq!(normalize("Zürich"), "zurich");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello   World  "), "hello world");
    }

    #[test]
    fn test_has_diacritics() {
        assert!(has_diacritics("café"));
        assert!(!has_diacritics("cafe"));
    }

    #[test]
    fn test_word_signature_rules() {
        // ph -> f, vowels dropped after first char
        assert_eq!(word_signature("phone"), "fn");
        // ck -> k, doubled consonants squeezed
        assert_eq!(word_signature("attack"), "atk");
        // First vowel kept
        assert_eq!(word_signature("apple"), "apl");
        // Empty and non-alphabetic input
        assert_eq!(word_signature(""), "");
        assert_eq!(word_signature("123"), "");
    }

    #[test]
    fn test_word_signature_stable_and_bounded() {
        let sig = word_signature("extraordinarily");
        assert_eq!(sig, word_signature("extraordinarily"));
        assert!(sig.chars().count() <= 6);
    }

    #[test]
    fn test_similar_words_share_signature() {
        assert_eq!(word_signature("color"), word_signature("colour"));
    }

    #[test]
    fn test_vocabulary_hash_stable() {
        let vocab: Vec<String> = ["apple", "banana", "cherry"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let h1 = vocabulary_hash(&vocab, None);
        let h2 = vocabulary_hash(&vocab, None);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_vocabulary_hash_model_isolation() {
        let vocab: Vec<String> = ["apple"].iter().map(|s| s.to_string()).collect();
        assert_ne!(
            vocabulary_hash(&vocab, Some("model-a")),
            vocabulary_hash(&vocab, Some("model-b"))
        );
    }

    #[test]
    fn test_vocabulary_hash_samples_large_vocab() {
        let vocab: Vec<String> = (0..100).map(|i| format!("word{:03}", i)).collect();
        let hash = vocabulary_hash(&vocab, None);

        // Middle words do not influence the sample
        let mut tweaked = vocab.clone();
        tweaked[50] = "zzz-changed".to_string();
        let mut tweaked_sorted = tweaked;
        // Keep sort order identical for the sample windows
        tweaked_sorted[50] = "word050-changed".to_string();
        assert_eq!(hash, vocabulary_hash(&tweaked_sorted, None));

        // Length changes do
        let shorter: Vec<String> = vocab[..99].to_vec();
        assert_ne!(hash, vocabulary_hash(&shorter, None));
    }
}
