//! Process startup: configuration, provider, storage, index, pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use finscout_llm::ollama::OllamaProvider;
use finscout_llm::{AnyProvider, LlmProvider};
use finscout_memory::{
    AnalysisRecord, BuildOutcome, KnowledgeIndex, MemoryError, RetrievalGateway, SqliteStore,
    VectorStore,
};
use finscout_tools::{Browser, ContentExtractor, HttpBrowser, SourceReference};

use crate::config::{Config, ProviderKind};
use crate::pipeline::instructions::PlanSettings;
use crate::pipeline::{AnalysisPipeline, PipelineError, StageRunner, StageTrace, Toolbox};
use crate::review::{self, ReviewDecision, ReviewOutcome};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Loads configuration and assembles an [`App`] from it.
pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Load and validate the configuration at `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or holds invalid values.
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&config_path)?;
        config.validate()?;
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the provider cannot be constructed.
    pub async fn build_provider(&self) -> anyhow::Result<AnyProvider> {
        let provider = create_provider(&self.config)?;
        health_check(&provider).await;
        Ok(provider)
    }

    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open_store(&self) -> anyhow::Result<SqliteStore> {
        let path = &self.config.storage.sqlite_path;
        SqliteStore::new(path)
            .await
            .with_context(|| format!("failed to open database at {path}"))
    }

    /// Assemble the application with the configured provider and the HTTP browser.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or the database cannot be set up.
    pub async fn build(self) -> anyhow::Result<App<AnyProvider, HttpBrowser>> {
        let provider = self.build_provider().await?;
        let store = self.open_store().await?;
        let browser = HttpBrowser::new(&self.config.extract);
        Ok(App::assemble(self.config, Arc::new(provider), browser, store))
    }
}

/// Config path from the command line, then `FINSCOUT_CONFIG`, then the default.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("FINSCOUT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// # Errors
///
/// Returns an error if the configured provider cannot be constructed.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::Ollama => {
            let base_url = check_base_url(&config.llm.base_url)?;
            Ok(AnyProvider::Ollama(OllamaProvider::new(
                base_url,
                config.llm.model.clone(),
                config.llm.embedding_model.clone(),
            )))
        }
    }
}

fn check_base_url(base_url: &str) -> anyhow::Result<&str> {
    let lower = base_url.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        anyhow::bail!("llm.base_url must be an http(s) URL, got '{base_url}'");
    }
    Ok(base_url)
}

pub async fn health_check(provider: &AnyProvider) {
    match provider.health_check().await {
        Ok(()) => tracing::info!("{} health check passed", provider.name()),
        Err(e) => tracing::warn!("{} health check failed: {e:#}", provider.name()),
    }
}

/// The assembled application: one knowledge index, one pipeline, one store.
pub struct App<P, B> {
    config: Config,
    store: SqliteStore,
    index: Arc<KnowledgeIndex<P>>,
    pipeline: AnalysisPipeline<Toolbox<B, P>, P>,
}

impl<P, B> App<P, B>
where
    P: LlmProvider,
    B: Browser,
{
    /// Wire the extractor, index, retrieval gateway and pipeline together.
    /// The vectors live in `store` next to the analyses.
    #[must_use]
    pub fn assemble(config: Config, provider: Arc<P>, browser: B, store: SqliteStore) -> Self {
        let vectors: Arc<dyn VectorStore> = Arc::new(store.clone());
        Self::assemble_with_vectors(config, provider, browser, store, vectors)
    }

    /// Like [`Self::assemble`] with a separate vector store.
    #[must_use]
    pub fn assemble_with_vectors(
        config: Config,
        provider: Arc<P>,
        browser: B,
        store: SqliteStore,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        let index = Arc::new(KnowledgeIndex::new(
            vectors,
            Arc::clone(&provider),
            config.corpus.collection.clone(),
            config.corpus.chunker.clone(),
            config.timeouts.embedding(),
        ));
        let retrieval = Arc::new(RetrievalGateway::new(
            Arc::clone(&index),
            Arc::clone(&provider),
            config.retrieval.clone(),
            config.timeouts.llm(),
        ));
        let extractor = Arc::new(ContentExtractor::new(browser, &config.extract));
        let runner = StageRunner::new(
            Arc::new(Toolbox::new(extractor, retrieval)),
            provider,
            config.pipeline.max_turns,
            config.timeouts.llm(),
        );
        let pipeline = AnalysisPipeline::new(
            runner,
            PlanSettings {
                organization: config.pipeline.organization.clone(),
                min_distinct_queries: config.pipeline.min_distinct_queries,
            },
        );

        Self {
            config,
            store,
            index,
            pipeline,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &Arc<KnowledgeIndex<P>> {
        &self.index
    }

    /// Build the knowledge index unless a completed build exists. Call once
    /// before the first analysis.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, chunking, embedding or storing fails.
    pub async fn initialize_index(&self) -> Result<BuildOutcome, MemoryError> {
        self.index.initialize(&self.config.corpus.dir).await
    }

    /// Drop the stored index and build it again from the corpus directory.
    ///
    /// # Errors
    ///
    /// As for [`Self::initialize_index`].
    pub async fn rebuild_index(&self) -> Result<BuildOutcome, MemoryError> {
        self.index.clear().await?;
        self.initialize_index().await
    }

    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub async fn analyze(&self, source: &SourceReference) -> Result<String, PipelineError> {
        self.pipeline.run(source).await
    }

    pub async fn analyze_with_trace(
        &self,
        source: &SourceReference,
    ) -> (Result<String, PipelineError>, StageTrace) {
        self.pipeline.run_with_trace(source).await
    }

    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn record_review(
        &self,
        source: &SourceReference,
        report: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewOutcome, MemoryError> {
        review::record_review(&self.store, source, report, decision).await
    }

    /// Saved analyses, newest first; at most `limit` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<AnalysisRecord>, MemoryError> {
        match limit {
            Some(n) => self.store.recent_analyses(i64::try_from(n)?).await,
            None => self.store.list_analyses().await,
        }
    }
}
