//! Smart-cascade search behavior over a full context.

use std::sync::Arc;

use tempfile::TempDir;

use lexica_core::{
    CoreContext, Corpus, Language, SearchEngine, SearchMethod, SearchMode,
};

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn engine(items: &[&str], semantic: bool) -> (SearchEngine, TempDir) {
    let temp = TempDir::new().unwrap();
    let ctx = CoreContext::new(temp.path()).unwrap();

    let corpus = Corpus::create(
        Some("cascade-test".into()),
        words(items),
        Language::English,
        ctx.lemmatizer.as_ref(),
    );

    let engine = SearchEngine::build(
        &ctx.versions,
        corpus,
        semantic,
        Arc::clone(&ctx.lemmatizer),
        Arc::clone(&ctx.embedder),
        None,
    )
    .await
    .unwrap();
    (engine, temp)
}

#[tokio::test]
async fn exact_hit_short_circuits_cascade() {
    let (engine, _temp) = engine(&["algorithm", "logarithm", "rhythm"], true).await;

    let results = engine.search("algorithm", SearchMode::Smart, 20, None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].word, "algorithm");
    assert_eq!(results[0].score, 1.0);
    assert_eq!(results[0].method, SearchMethod::Exact);

    let metrics = engine.metrics();
    assert_eq!(metrics.exact_calls, 1);
    assert_eq!(metrics.fuzzy_calls, 0, "fuzzy must not run on an exact hit");
    assert_eq!(metrics.semantic_calls, 0, "semantic must not run on an exact hit");
}

#[tokio::test]
async fn miss_cascades_to_fuzzy_and_semantic() {
    let (engine, _temp) = engine(&["algorithm", "logarithm", "rhythm"], true).await;

    let results = engine.search("algoritm", SearchMode::Smart, 10, Some(0.4));
    assert!(!results.is_empty());
    assert_eq!(results[0].word, "algorithm");

    let metrics = engine.metrics();
    assert_eq!(metrics.exact_calls, 1);
    assert_eq!(metrics.fuzzy_calls, 1);
    assert_eq!(metrics.semantic_calls, 1);
}

#[tokio::test]
async fn merged_results_deduplicated_and_ranked() {
    let (engine, _temp) = engine(&["carted", "cart", "carts", "dog"], true).await;

    let results = engine.search("cartz", SearchMode::Smart, 10, Some(0.3));

    // No duplicate words after the fuzzy/semantic merge.
    let mut seen = std::collections::HashSet::new();
    for result in &results {
        assert!(seen.insert(result.word.clone()), "duplicate {}", result.word);
    }
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn explicit_modes_bypass_cascade() {
    let (engine, _temp) = engine(&["apple", "apply", "maple"], true).await;

    let fuzzy_only = engine.search("aple", SearchMode::Fuzzy, 10, Some(0.3));
    assert!(fuzzy_only.iter().all(|r| r.method == SearchMethod::Fuzzy));
    assert_eq!(engine.metrics().exact_calls, 0);

    let semantic_only = engine.search("aple", SearchMode::Semantic, 10, Some(0.0));
    assert!(semantic_only
        .iter()
        .all(|r| r.method == SearchMethod::Semantic));
}

#[tokio::test]
async fn empty_and_unmatchable_queries() {
    let (engine, _temp) = engine(&["apple"], false).await;

    assert!(engine.search("", SearchMode::Smart, 10, None).is_empty());
    assert!(engine.search("   ", SearchMode::Smart, 10, None).is_empty());

    let results = engine.search("zzzzqqqq", SearchMode::Smart, 10, Some(0.95));
    assert!(results.is_empty());
}

#[tokio::test]
async fn diacritic_queries_normalize() {
    let (engine, _temp) = engine(&["café", "cafe", "creme"], false).await;

    // Accented and plain queries resolve to the same preferred form.
    let accented = engine.search("café", SearchMode::Smart, 10, None);
    let plain = engine.search("cafe", SearchMode::Smart, 10, None);
    assert_eq!(accented[0].word, "café");
    assert_eq!(plain[0].word, "café");
    assert_eq!(accented[0].method, SearchMethod::Exact);
}
