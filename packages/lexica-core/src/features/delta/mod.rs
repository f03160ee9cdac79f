//! Pure functions for delta-based version storage.
//!
//! Zero I/O, deterministic, testable in isolation. Deltas are backward:
//! `compute_delta(old, new)` produces operations that reconstruct `old` when
//! applied to `new`. Snapshots are kept for the newest version of a chain and
//! older versions are rebuilt by applying deltas newest→oldest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeltaError {
    #[error("Cannot apply delta: {0}")]
    Apply(String),
}

pub type DeltaResult<T> = Result<T, DeltaError>;

/// Configuration for delta-based version storage.
///
/// Controls when full snapshots are kept versus delta-compressed versions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Full snapshot every N versions.
    pub snapshot_interval: u64,

    /// Safety limit on delta chain traversal.
    pub max_chain_length: usize,

    pub enabled: bool,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 10,
            max_chain_length: 50,
            enabled: true,
        }
    }
}

/// Serializable backward delta between two JSON objects.
///
/// Paths are `/`-joined key sequences. Arrays and scalars are replaced
/// wholesale; only objects are recursed into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Paths to set (with the older value) when walking back in history.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,

    /// Paths present in the newer version but absent in the older one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

fn diff_objects(prefix: &str, old: &Map<String, Value>, new: &Map<String, Value>, delta: &mut Delta) {
    for (key, old_value) in old {
        let path = join_path(prefix, key);
        match new.get(key) {
            None => {
                delta.set.insert(path, old_value.clone());
            }
            Some(new_value) if new_value == old_value => {}
            Some(Value::Object(new_map)) => {
                if let Value::Object(old_map) = old_value {
                    diff_objects(&path, old_map, new_map, delta);
                } else {
                    delta.set.insert(path, old_value.clone());
                }
            }
            Some(_) => {
                delta.set.insert(path, old_value.clone());
            }
        }
    }

    for key in new.keys() {
        if !old.contains_key(key) {
            delta.remove.push(join_path(prefix, key));
        }
    }
}

/// Compute a serializable delta from `old` to `new` content.
///
/// The delta reconstructs `old` from `new` via [`apply_delta`].
pub fn compute_delta(old: &Map<String, Value>, new: &Map<String, Value>) -> Delta {
    let mut delta = Delta::default();
    diff_objects("", old, new, &mut delta);
    delta.remove.sort();
    delta
}

fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('/').peekable();
    let mut current = root;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }

        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().expect("just ensured object");
    }
}

fn remove_path(root: &mut Map<String, Value>, path: &str) -> DeltaResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| DeltaError::Apply("empty path".to_string()))?;

    let mut current = root;
    for segment in parents {
        current = current
            .get_mut(*segment)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| DeltaError::Apply(format!("path not found: {}", path)))?;
    }

    if current.remove(*last).is_none() {
        return Err(DeltaError::Apply(format!("path not found: {}", path)));
    }
    Ok(())
}

/// Reconstruct a previous version by applying a delta to a snapshot.
///
/// Fails when the delta references removal paths absent in the snapshot.
pub fn apply_delta(snapshot: &Map<String, Value>, delta: &Delta) -> DeltaResult<Map<String, Value>> {
    let mut result = snapshot.clone();

    for path in &delta.remove {
        remove_path(&mut result, path)?;
    }
    for (path, value) in &delta.set {
        set_path(&mut result, path, value.clone());
    }

    Ok(result)
}

/// Reconstruct a version by applying a chain of deltas, newest to oldest.
pub fn reconstruct_version(
    snapshot: &Map<String, Value>,
    delta_chain: &[Delta],
) -> DeltaResult<Map<String, Value>> {
    let mut result = snapshot.clone();
    for delta in delta_chain {
        result = apply_delta(&result, delta)?;
    }
    Ok(result)
}

/// Determine whether a version number should be kept as a full snapshot.
///
/// Version 0 (first) and every N-th version stay snapshots to bound the
/// maximum delta chain length.
pub fn should_keep_as_snapshot(version_num: u64, interval: u64) -> bool {
    version_num == 0 || (interval > 0 && version_num % interval == 0)
}

/// Human-readable categorized diff between two content objects.
///
/// Meant for API responses, not reconstruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentDiff {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values_changed: BTreeMap<String, ValueChange>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub items_added: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items_removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueChange {
    pub old_value: Value,
    pub new_value: Value,
}

impl ContentDiff {
    pub fn is_empty(&self) -> bool {
        self.values_changed.is_empty() && self.items_added.is_empty() && self.items_removed.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.values_changed.len() + self.items_added.len() + self.items_removed.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "+{} ~{} -{} (total: {})",
            self.items_added.len(),
            self.values_changed.len(),
            self.items_removed.len(),
            self.total_changes()
        )
    }
}

fn diff_for_display(
    prefix: &str,
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    diff: &mut ContentDiff,
) {
    for (key, a_value) in a {
        let path = join_path(prefix, key);
        match b.get(key) {
            None => diff.items_removed.push(path),
            Some(b_value) if b_value == a_value => {}
            Some(Value::Object(b_map)) => {
                if let Value::Object(a_map) = a_value {
                    diff_for_display(&path, a_map, b_map, diff);
                } else {
                    diff.values_changed.insert(
                        path,
                        ValueChange {
                            old_value: a_value.clone(),
                            new_value: Value::Object(b_map.clone()),
                        },
                    );
                }
            }
            Some(b_value) => {
                diff.values_changed.insert(
                    path,
                    ValueChange {
                        old_value: a_value.clone(),
                        new_value: b_value.clone(),
                    },
                );
            }
        }
    }

    for (key, b_value) in b {
        if !a.contains_key(key) {
            diff.items_added.insert(join_path(prefix, key), b_value.clone());
        }
    }
}

/// Compute a categorized diff between two content objects (`a` older,
/// `b` newer by convention).
pub fn compute_diff_between(a: &Map<String, Value>, b: &Map<String, Value>) -> ContentDiff {
    let mut diff = ContentDiff::default();
    diff_for_display("", a, b, &mut diff);
    diff.items_removed.sort();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_delta_round_trip() {
        let old = obj(json!({"a": 1, "b": 2}));
        let new = obj(json!({"a": 1, "b": 3, "c": 4}));

        let delta = compute_delta(&old, &new);
        assert_eq!(apply_delta(&new, &delta).unwrap(), old);
    }

    #[test]
    fn test_identical_content_empty_delta() {
        let content = obj(json!({"a": 1, "nested": {"b": [1, 2]}}));
        let delta = compute_delta(&content, &content);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_nested_object_delta_is_minimal() {
        let old = obj(json!({"outer": {"keep": 1, "change": "x"}, "top": true}));
        let new = obj(json!({"outer": {"keep": 1, "change": "y"}, "top": true}));

        let delta = compute_delta(&old, &new);
        assert_eq!(delta.set.len(), 1);
        assert_eq!(delta.set.get("outer/change"), Some(&json!("x")));
        assert_eq!(apply_delta(&new, &delta).unwrap(), old);
    }

    #[test]
    fn test_apply_delta_missing_path_fails() {
        let delta = Delta {
            set: BTreeMap::new(),
            remove: vec!["missing/key".to_string()],
        };
        let snapshot = obj(json!({"present": 1}));

        assert!(apply_delta(&snapshot, &delta).is_err());
    }

    #[test]
    fn test_reconstruct_chain_newest_to_oldest() {
        // v0..v3 each add one key
        let versions: Vec<Map<String, Value>> = (0..4)
            .map(|n| {
                let mut m = Map::new();
                for i in 0..=n {
                    m.insert(format!("k{}", i), json!(i));
                }
                m
            })
            .collect();

        // Backward deltas: delta[i] reconstructs v_i from v_{i+1}
        let deltas: Vec<Delta> = (0..3)
            .map(|i| compute_delta(&versions[i], &versions[i + 1]))
            .collect();

        // Reconstruct v0 from v3, applying newest -> oldest
        let chain = vec![deltas[2].clone(), deltas[1].clone(), deltas[0].clone()];
        assert_eq!(reconstruct_version(&versions[3], &chain).unwrap(), versions[0]);
    }

    #[test]
    fn test_snapshot_policy() {
        assert!(should_keep_as_snapshot(0, 10));
        assert!(!should_keep_as_snapshot(5, 10));
        assert!(should_keep_as_snapshot(10, 10));
        assert!(should_keep_as_snapshot(20, 10));
        assert!(!should_keep_as_snapshot(21, 10));
    }

    #[test]
    fn test_diff_between_categories() {
        let a = obj(json!({"stay": 1, "changed": "old", "gone": true}));
        let b = obj(json!({"stay": 1, "changed": "new", "fresh": [1]}));

        let diff = compute_diff_between(&a, &b);
        assert_eq!(diff.values_changed.len(), 1);
        assert_eq!(diff.items_added.len(), 1);
        assert_eq!(diff.items_removed, vec!["gone".to_string()]);
        assert_eq!(diff.total_changes(), 3);
        assert_eq!(diff.summary(), "+1 ~1 -1 (total: 3)");
    }

    #[test]
    fn test_array_replaced_wholesale() {
        let old = obj(json!({"list": [1, 2, 3]}));
        let new = obj(json!({"list": [1, 2, 3, 4]}));

        let delta = compute_delta(&old, &new);
        assert_eq!(delta.set.get("list"), Some(&json!([1, 2, 3])));
        assert_eq!(apply_delta(&new, &delta).unwrap(), old);
    }
}
