mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.max_turns == 0 {
            bail!("pipeline.max_turns must be at least 1");
        }
        if self.pipeline.min_distinct_queries >= self.pipeline.max_turns {
            bail!(
                "pipeline.min_distinct_queries ({}) must be below pipeline.max_turns ({})",
                self.pipeline.min_distinct_queries,
                self.pipeline.max_turns
            );
        }
        if self.retrieval.variants == 0 && !self.retrieval.include_original {
            bail!("retrieval.variants is 0 and retrieval.include_original is false: nothing to search");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            bail!("timeouts must be at least 1 second");
        }
        if self.extract.navigation_timeout_secs == 0 || self.extract.selector_timeout_secs == 0 {
            bail!("extract timeouts must be at least 1 second");
        }
        if self.corpus.collection.trim().is_empty() {
            bail!("corpus.collection must not be empty");
        }
        Ok(())
    }
}
