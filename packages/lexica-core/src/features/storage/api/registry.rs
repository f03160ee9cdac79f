//! Resource registry: closed table mapping kinds to storage behavior.
//!
//! Replaces the original system's dynamic class registry with a static table;
//! adding a kind means adding an enum variant and a row here.

use once_cell::sync::Lazy;

use crate::features::cache::Namespace;
use crate::features::storage::domain::models::ResourceKind;
use crate::features::storage::error::{VersionError, VersionResult};

/// Static description of one resource kind.
#[derive(Debug, Clone)]
pub struct KindSpec {
    pub kind: ResourceKind,
    pub namespace: Namespace,

    /// Metadata keys producers of this kind are expected to fill.
    pub metadata_fields: &'static [&'static str],

    pub description: &'static str,
}

static KIND_SPECS: Lazy<Vec<KindSpec>> = Lazy::new(|| {
    vec![
        KindSpec {
            kind: ResourceKind::Dictionary,
            namespace: Namespace::Dictionary,
            metadata_fields: &["provider", "word"],
            description: "Dictionary entries from providers",
        },
        KindSpec {
            kind: ResourceKind::Corpus,
            namespace: Namespace::Corpus,
            metadata_fields: &["corpus_name", "corpus_type", "language", "vocabulary_hash"],
            description: "Vocabulary corpora for language processing",
        },
        KindSpec {
            kind: ResourceKind::Language,
            namespace: Namespace::Language,
            metadata_fields: &["language"],
            description: "Language provider entries and vocabulary",
        },
        KindSpec {
            kind: ResourceKind::Semantic,
            namespace: Namespace::Semantic,
            metadata_fields: &["corpus_uuid", "model_name", "vocabulary_hash"],
            description: "Dense-vector indices for semantic search",
        },
        KindSpec {
            kind: ResourceKind::Literature,
            namespace: Namespace::Literature,
            metadata_fields: &["title", "author"],
            description: "Full literary texts and metadata",
        },
        KindSpec {
            kind: ResourceKind::Trie,
            namespace: Namespace::Trie,
            metadata_fields: &["corpus_uuid", "vocabulary_hash"],
            description: "Prefix indices for exact and autocomplete search",
        },
        KindSpec {
            kind: ResourceKind::Search,
            namespace: Namespace::Search,
            metadata_fields: &["corpus_uuid", "vocabulary_hash"],
            description: "Composite search index metadata",
        },
    ]
});

/// Look up the spec for a kind.
pub fn kind_spec(kind: ResourceKind) -> &'static KindSpec {
    KIND_SPECS
        .iter()
        .find(|spec| spec.kind == kind)
        .expect("every kind has a registry row")
}

/// Parse a kind name, failing with `UnknownKind`.
pub fn resolve_kind(name: &str) -> VersionResult<ResourceKind> {
    ResourceKind::parse(name).ok_or_else(|| VersionError::UnknownKind(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_row() {
        for kind in ResourceKind::ALL {
            let spec = kind_spec(kind);
            assert_eq!(spec.kind, kind);
            assert_eq!(spec.namespace, kind.default_namespace());
        }
    }

    #[test]
    fn test_resolve_kind() {
        assert!(resolve_kind("corpus").is_ok());
        assert!(matches!(
            resolve_kind("widget"),
            Err(VersionError::UnknownKind(_))
        ));
    }
}
