//! Explicit core context.
//!
//! No global singletons: the cache manager, version manager, and
//! text/embedding contracts are bound once at startup and carried through
//! call stacks. Tests construct a fresh context per test over a temp
//! directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::features::cache::{
    CacheManager, CacheSettings, DiskBackend, DEFAULT_SWEEP_INTERVAL,
};
use crate::features::corpus::{Lemmatizer, NoopLemmatizer};
use crate::features::semantic::{Embedder, HashEmbedder};
use crate::features::storage::{
    MemoryVersionStore, VersionManager, VersionManagerSettings, VersionStore,
};
use crate::shared::error::CoreResult;

pub struct CoreContext {
    pub cache: Arc<CacheManager>,
    pub versions: Arc<VersionManager>,
    pub lemmatizer: Arc<dyn Lemmatizer>,
    pub embedder: Arc<dyn Embedder>,
}

impl CoreContext {
    /// Default wiring: disk backend under `cache_dir`, in-memory version
    /// store, identity lemmatizer, hash embedder.
    pub fn new(cache_dir: &Path) -> CoreResult<CoreContext> {
        Self::builder(cache_dir).build()
    }

    pub fn builder(cache_dir: &Path) -> CoreContextBuilder {
        CoreContextBuilder {
            cache_dir: cache_dir.to_path_buf(),
            cache_settings: CacheSettings::default(),
            version_settings: VersionManagerSettings::default(),
            store: None,
            lemmatizer: None,
            embedder: None,
        }
    }

    /// Create and persist a corpus, optionally building its semantic index
    /// up front.
    pub async fn create_corpus(
        &self,
        corpus_name: Option<String>,
        vocabulary: Vec<String>,
        language: crate::features::corpus::Language,
        semantic: bool,
    ) -> CoreResult<crate::features::corpus::Corpus> {
        use crate::features::semantic::SemanticIndex;
        use crate::features::storage::VersionConfig;

        let corpus = crate::features::corpus::Corpus::create(
            corpus_name,
            vocabulary,
            language,
            self.lemmatizer.as_ref(),
        );
        corpus.save(&self.versions, VersionConfig::new()).await?;

        if semantic {
            if let Err(e) = SemanticIndex::get_or_create(
                &self.versions,
                &corpus,
                self.embedder.as_ref(),
                VersionConfig::new(),
            )
            .await
            {
                tracing::warn!(
                    corpus_name = %corpus.corpus_name,
                    error = %e,
                    "failed to create semantic index for new corpus"
                );
            }
        }
        Ok(corpus)
    }

    /// Start the periodic L1 TTL sweeper.
    pub async fn start_background_tasks(&self) {
        self.cache.start_sweeper(DEFAULT_SWEEP_INTERVAL).await;
    }

    pub async fn start_background_tasks_with(&self, sweep_interval: Duration) {
        self.cache.start_sweeper(sweep_interval).await;
    }

    /// Cancel and drain background tasks.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }
}

pub struct CoreContextBuilder {
    cache_dir: std::path::PathBuf,
    cache_settings: CacheSettings,
    version_settings: VersionManagerSettings,
    store: Option<Arc<dyn VersionStore>>,
    lemmatizer: Option<Arc<dyn Lemmatizer>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl CoreContextBuilder {
    pub fn cache_settings(mut self, settings: CacheSettings) -> Self {
        self.cache_settings = settings;
        self
    }

    pub fn version_settings(mut self, settings: VersionManagerSettings) -> Self {
        self.version_settings = settings;
        self
    }

    pub fn version_store(mut self, store: Arc<dyn VersionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn lemmatizer(mut self, lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        self.lemmatizer = Some(lemmatizer);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn build(self) -> CoreResult<CoreContext> {
        let backend = DiskBackend::new(&self.cache_dir)?;
        let cache = Arc::new(CacheManager::new(backend, self.cache_settings));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryVersionStore::new()));
        let versions = Arc::new(VersionManager::new(
            store,
            Arc::clone(&cache),
            self.version_settings,
        ));

        Ok(CoreContext {
            cache,
            versions,
            lemmatizer: self.lemmatizer.unwrap_or_else(|| Arc::new(NoopLemmatizer)),
            embedder: self.embedder.unwrap_or_else(|| Arc::new(HashEmbedder::default())),
        })
    }
}
