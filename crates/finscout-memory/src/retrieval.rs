//! Multi-query retrieval over the knowledge index.
//!
//! A query is rephrased into several variants by the LLM; each variant is
//! searched independently and the union of hits, deduplicated by chunk id,
//! becomes the grounding context.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use finscout_llm::provider::chat_with_timeout;
use finscout_llm::{LlmProvider, Message};
use serde::Deserialize;

use crate::corpus::{KnowledgeIndex, RetrievedChunk};
use crate::error::MemoryError;

fn default_variants() -> usize {
    3
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Rephrasings requested from the LLM per query.
    #[serde(default = "default_variants")]
    pub variants: usize,
    /// Hits kept per variant.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Also search the query exactly as given.
    #[serde(default)]
    pub include_original: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            top_k: default_top_k(),
            include_original: false,
        }
    }
}

pub struct RetrievalGateway<P> {
    index: Arc<KnowledgeIndex<P>>,
    provider: Arc<P>,
    config: RetrievalConfig,
    llm_timeout: Duration,
}

impl<P: LlmProvider> RetrievalGateway<P> {
    #[must_use]
    pub fn new(
        index: Arc<KnowledgeIndex<P>>,
        provider: Arc<P>,
        config: RetrievalConfig,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            index,
            provider,
            config,
            llm_timeout,
        }
    }

    /// Grounding context for `query` as numbered passages. Empty when nothing
    /// in the corpus matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be searched.
    pub async fn retrieve(&self, query: &str) -> Result<String, MemoryError> {
        let chunks = self.retrieve_chunks(query).await?;
        Ok(format_context(&chunks))
    }

    /// Union of hits over all query variants, first-seen order, no duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be searched.
    pub async fn retrieve_chunks(&self, query: &str) -> Result<Vec<RetrievedChunk>, MemoryError> {
        let mut queries = self.expand(query).await;
        if self.config.include_original && !queries.iter().any(|q| q == query) {
            queries.insert(0, query.to_owned());
        }

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for variant in &queries {
            for hit in self.index.query(variant, self.config.top_k).await? {
                if seen.insert(hit.id.clone()) {
                    merged.push(hit);
                }
            }
        }

        tracing::debug!(
            variants = queries.len(),
            hits = merged.len(),
            "retrieved context for '{query}'"
        );
        Ok(merged)
    }

    /// Alternative phrasings of `query`. Falls back to the query itself when
    /// the LLM fails or returns nothing usable.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let messages = [
            Message::system(
                "You help search a knowledge base of financial regulation and compliance \
                 guidance. Rewrite questions so that similarity search finds relevant passages.",
            ),
            Message::user(format!(
                "Generate {} different versions of the question below, each on its own line, \
                 with no numbering or commentary.\n\nQuestion: {query}",
                self.config.variants
            )),
        ];

        match chat_with_timeout(self.provider.as_ref(), &messages, self.llm_timeout).await {
            Ok(response) => {
                let variants = parse_variants(&response, self.config.variants);
                if variants.is_empty() {
                    vec![query.to_owned()]
                } else {
                    variants
                }
            }
            Err(e) => {
                tracing::warn!("query expansion failed, searching the original query: {e}");
                vec![query.to_owned()]
            }
        }
    }
}

/// One variant per non-empty line, list markers stripped, duplicates dropped.
#[must_use]
pub fn parse_variants(response: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    response
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_lowercase()))
        .map(str::to_owned)
        .take(limit)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }
    line.trim()
}

/// Render hits as numbered passages with their sources.
#[must_use]
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] (source: {})\n{}", i + 1, c.source, c.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
