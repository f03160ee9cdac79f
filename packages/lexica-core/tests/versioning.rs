//! End-to-end version chain behavior through the public API.

use std::sync::Arc;

use semver::Version;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use lexica_core::features::storage::{version_diff, version_history};
use lexica_core::{CoreContext, ResourceKind, SaveRequest, StorageMode, VersionError};

fn content(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

async fn context() -> (CoreContext, TempDir) {
    let temp = TempDir::new().unwrap();
    let ctx = CoreContext::new(temp.path()).unwrap();
    (ctx, temp)
}

#[tokio::test]
async fn save_and_get_latest() {
    let (ctx, _temp) = context().await;

    let record = ctx
        .versions
        .save(SaveRequest::new(
            "hello",
            ResourceKind::Dictionary,
            content(json!({"defs": ["a greeting"]})),
        ))
        .await
        .unwrap();

    assert_eq!(record.version_info.version, Version::new(1, 0, 0));
    assert!(record.version_info.is_latest);
    assert_eq!(record.version_info.data_hash.len(), 64);

    let latest = ctx
        .versions
        .get_latest("hello", ResourceKind::Dictionary, true, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.content_inline.unwrap()["defs"], json!(["a greeting"]));
}

#[tokio::test]
async fn dedup_by_content_hash() {
    let (ctx, _temp) = context().await;
    let payload = content(json!({"defs": ["a greeting"]}));

    let first = ctx
        .versions
        .save(SaveRequest::new("hello", ResourceKind::Dictionary, payload.clone()))
        .await
        .unwrap();
    let second = ctx
        .versions
        .save(SaveRequest::new("hello", ResourceKind::Dictionary, payload))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        ctx.versions
            .list_versions("hello", ResourceKind::Dictionary)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn version_increment_flips_latest_pointer() {
    let (ctx, _temp) = context().await;

    let v1 = ctx
        .versions
        .save(SaveRequest::new(
            "hello",
            ResourceKind::Dictionary,
            content(json!({"defs": ["a greeting"]})),
        ))
        .await
        .unwrap();
    let v2 = ctx
        .versions
        .save(SaveRequest::new(
            "hello",
            ResourceKind::Dictionary,
            content(json!({"defs": ["a greeting", "hi"]})),
        ))
        .await
        .unwrap();

    assert_eq!(v2.version_info.version, Version::new(1, 0, 1));

    let old = ctx
        .versions
        .get_by_version("hello", ResourceKind::Dictionary, &Version::new(1, 0, 0))
        .await
        .unwrap()
        .unwrap();
    assert!(!old.version_info.is_latest);
    assert_eq!(old.version_info.superseded_by, Some(v2.id));
    assert_eq!(v2.version_info.supersedes, Some(v1.id));

    // Exactly one latest
    let latest_count = ctx
        .versions
        .list_versions("hello", ResourceKind::Dictionary)
        .await
        .unwrap()
        .iter()
        .filter(|v| v.is_latest)
        .count();
    assert_eq!(latest_count, 1);
}

#[tokio::test]
async fn rollback_restores_content_and_preserves_history() {
    let (ctx, _temp) = context().await;

    ctx.versions
        .save(SaveRequest::new(
            "hello",
            ResourceKind::Dictionary,
            content(json!({"defs": ["a greeting"]})),
        ))
        .await
        .unwrap();
    ctx.versions
        .save(SaveRequest::new(
            "hello",
            ResourceKind::Dictionary,
            content(json!({"defs": ["a greeting", "hi"]})),
        ))
        .await
        .unwrap();

    let rolled = ctx
        .versions
        .rollback("hello", ResourceKind::Dictionary, &Version::new(1, 0, 0))
        .await
        .unwrap();

    assert_eq!(rolled.version_info.version, Version::new(1, 0, 2));
    assert_eq!(rolled.metadata["rollback_from"], json!("1.0.0"));
    assert_eq!(rolled.content_inline.unwrap()["defs"], json!(["a greeting"]));
    assert_eq!(
        ctx.versions
            .list_versions("hello", ResourceKind::Dictionary)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn delta_chain_reconstructs_exact_content() {
    let (ctx, _temp) = context().await;

    // 11 versions of a map that adds one key per version.
    for i in 0..11u64 {
        let mut payload = Map::new();
        for k in 0..=i {
            payload.insert(format!("key{}", k), json!(k));
        }
        ctx.versions
            .save(SaveRequest::new("doc", ResourceKind::Dictionary, payload))
            .await
            .unwrap();
    }

    let v3 = ctx
        .versions
        .get_by_version("doc", ResourceKind::Dictionary, &Version::new(1, 0, 3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(v3.version_info.storage_mode, StorageMode::Delta);

    let expected: Map<String, Value> = (0..=3u64)
        .map(|k| (format!("key{}", k), json!(k)))
        .collect();
    assert_eq!(v3.content_inline.unwrap(), Value::Object(expected));

    // Every version in the chain reconstructs to its own hash-verified
    // content (materialize re-hashes and would fail on any drift).
    for patch in 0..11u64 {
        let record = ctx
            .versions
            .get_by_version("doc", ResourceKind::Dictionary, &Version::new(1, 0, patch))
            .await
            .unwrap()
            .unwrap();
        let map = record.content_inline.unwrap();
        assert_eq!(map.as_object().unwrap().len(), patch as usize + 1);
    }
}

#[tokio::test]
async fn history_and_diff_surface() {
    let (ctx, _temp) = context().await;

    for defs in [json!(["a"]), json!(["a", "b"])] {
        ctx.versions
            .save(SaveRequest::new(
                "hello:synthesis",
                ResourceKind::Dictionary,
                content(json!({"defs": defs, "word": "hello"})),
            ))
            .await
            .unwrap();
    }

    let history = version_history(&ctx.versions, "hello:synthesis", ResourceKind::Dictionary)
        .await
        .unwrap();
    assert_eq!(history.total_versions, 2);
    assert!(history.versions[0].is_latest);
    assert!(history.versions[0].created_at >= history.versions[1].created_at);

    let diff = version_diff(
        &ctx.versions,
        "hello:synthesis",
        ResourceKind::Dictionary,
        &Version::new(1, 0, 0),
        &Version::new(1, 0, 1),
    )
    .await
    .unwrap();
    assert!(diff.diff.values_changed.contains_key("defs"));

    let missing = version_history(&ctx.versions, "absent", ResourceKind::Dictionary).await;
    assert!(matches!(missing, Err(VersionError::VersionNotFound { .. })));
}

#[tokio::test]
async fn concurrent_saves_serialize_per_resource() {
    let (ctx, _temp) = context().await;
    let versions = Arc::clone(&ctx.versions);

    let mut handles = Vec::new();
    for i in 0..10 {
        let versions = Arc::clone(&versions);
        handles.push(tokio::spawn(async move {
            versions
                .save(SaveRequest::new(
                    "contended",
                    ResourceKind::Dictionary,
                    content(json!({"n": i})),
                ))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let summaries = ctx
        .versions
        .list_versions("contended", ResourceKind::Dictionary)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 10);

    // Newest-first listing; strictly increasing read oldest→newest.
    let patches: Vec<u64> = summaries.iter().rev().map(|s| s.version.patch).collect();
    assert!(patches.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(summaries.iter().filter(|s| s.is_latest).count(), 1);
}
