//! The knowledge corpus index.
//!
//! Built once from the markdown corpus directory and reused across runs. A
//! build marker is written only after every chunk has been stored, so an
//! interrupted build is detected and redone on the next start.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use finscout_llm::LlmProvider;
use finscout_llm::provider::embed_with_timeout;
use serde_json::json;
use tokio::sync::Mutex;

use crate::chunker::{ChunkerConfig, SemanticChunker};
use crate::document::{self, TextLoader};
use crate::error::MemoryError;
use crate::vector_store::{BuildMarker, VectorPoint, VectorStore};

const UPSERT_BATCH: usize = 64;

/// What `initialize` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    AlreadyBuilt { chunks: u64 },
    Built { documents: usize, chunks: u64 },
}

/// A corpus chunk returned for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub score: f32,
}

pub struct KnowledgeIndex<P> {
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
    chunker: SemanticChunker<P>,
    collection: String,
    embed_timeout: Duration,
    build_lock: Mutex<()>,
}

impl<P: LlmProvider> KnowledgeIndex<P> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<P>,
        collection: impl Into<String>,
        chunker: ChunkerConfig,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            store,
            chunker: SemanticChunker::new(Arc::clone(&provider), chunker, embed_timeout),
            provider,
            collection: collection.into(),
            embed_timeout,
            build_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn is_built(&self) -> Result<bool, MemoryError> {
        Ok(self.store.build_marker(&self.collection).await?.is_some())
    }

    /// Build the index from `corpus_dir` unless a completed build exists.
    ///
    /// Entries left by an interrupted build are discarded first.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, chunking, embedding, or storing fails.
    /// No build marker is written in that case.
    pub async fn initialize(&self, corpus_dir: &Path) -> Result<BuildOutcome, MemoryError> {
        let _guard = self.build_lock.lock().await;

        if let Some(marker) = self.store.build_marker(&self.collection).await? {
            tracing::debug!(
                chunks = marker.chunks,
                "knowledge index '{}' already built",
                self.collection
            );
            return Ok(BuildOutcome::AlreadyBuilt {
                chunks: marker.chunks,
            });
        }

        let leftover = self.store.count(&self.collection).await?;
        if leftover > 0 {
            tracing::warn!(
                leftover,
                "knowledge index '{}' has entries but no build marker, rebuilding",
                self.collection
            );
        }
        self.store.delete_collection(&self.collection).await?;

        let documents = document::load_corpus(corpus_dir, &TextLoader::default()).await?;
        tracing::info!(
            documents = documents.len(),
            "building knowledge index from {}",
            corpus_dir.display()
        );

        let mut seen = HashSet::new();
        let mut points = Vec::new();
        let mut dimensions = 0_u64;
        for doc in &documents {
            for chunk in self.chunker.split(doc).await? {
                let id = chunk.content_hash();
                if !seen.insert(id.clone()) {
                    continue;
                }
                let vector =
                    embed_with_timeout(self.provider.as_ref(), &chunk.content, self.embed_timeout)
                        .await?;
                if dimensions == 0 {
                    dimensions = vector.len() as u64;
                    self.store
                        .ensure_collection(&self.collection, dimensions)
                        .await?;
                }
                let payload: HashMap<String, serde_json::Value> = HashMap::from([
                    ("content".to_owned(), json!(chunk.content)),
                    ("source".to_owned(), json!(chunk.metadata.source)),
                    ("chunk_index".to_owned(), json!(chunk.chunk_index)),
                ]);
                points.push(VectorPoint {
                    id,
                    vector,
                    payload,
                });
                if points.len() >= UPSERT_BATCH {
                    self.store
                        .upsert(&self.collection, std::mem::take(&mut points))
                        .await?;
                }
            }
        }
        if !points.is_empty() {
            self.store.upsert(&self.collection, points).await?;
        }

        let chunks = seen.len() as u64;
        if chunks == 0 {
            tracing::warn!(
                "knowledge corpus {} produced no chunks, index '{}' left unmarked",
                corpus_dir.display(),
                self.collection
            );
            return Ok(BuildOutcome::Built {
                documents: documents.len(),
                chunks,
            });
        }
        self.store
            .set_build_marker(&self.collection, BuildMarker { chunks, dimensions })
            .await?;
        tracing::info!(chunks, "knowledge index '{}' built", self.collection);

        Ok(BuildOutcome::Built {
            documents: documents.len(),
            chunks,
        })
    }

    /// Drop the index so the next `initialize` rebuilds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot delete the collection.
    pub async fn clear(&self) -> Result<(), MemoryError> {
        let _guard = self.build_lock.lock().await;
        self.store.delete_collection(&self.collection).await?;
        Ok(())
    }

    /// The `k` chunks most similar to `text`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or searching fails.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, MemoryError> {
        let vector = embed_with_timeout(self.provider.as_ref(), text, self.embed_timeout).await?;
        let hits = self
            .store
            .search(&self.collection, vector, k as u64)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let field = |name: &str| {
                    hit.payload
                        .get(name)
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_owned()
                };
                RetrievedChunk {
                    content: field("content"),
                    source: field("source"),
                    id: hit.id,
                    score: hit.score,
                }
            })
            .collect())
    }
}
