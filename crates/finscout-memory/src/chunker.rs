//! Embedding-driven chunking.
//!
//! Sentences are embedded together with their neighbours; a chunk boundary
//! falls wherever the cosine distance between consecutive windows exceeds a
//! threshold derived from the [`BreakpointStrategy`].

use std::sync::Arc;
use std::time::Duration;

use finscout_llm::LlmProvider;
use finscout_llm::provider::embed_with_timeout;
use serde::Deserialize;

use crate::document::{Chunk, Document};
use crate::error::MemoryError;
use crate::vector_store::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointStrategy {
    /// Split at distances above this percentile (0-100) of all adjacent distances.
    Percentile(f32),
    /// Split wherever adjacent similarity drops below this value.
    Similarity(f32),
}

impl BreakpointStrategy {
    #[must_use]
    pub fn threshold(&self, distances: &[f32]) -> f32 {
        match self {
            Self::Percentile(p) => percentile(distances, *p),
            Self::Similarity(s) => 1.0 - s,
        }
    }
}

fn default_breakpoint() -> BreakpointStrategy {
    BreakpointStrategy::Percentile(95.0)
}

fn default_buffer_size() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_breakpoint")]
    pub breakpoint: BreakpointStrategy,
    /// Neighbouring sentences on each side embedded with a sentence.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Chunks shorter than this are merged into a neighbour.
    #[serde(default)]
    pub min_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            breakpoint: default_breakpoint(),
            buffer_size: default_buffer_size(),
            min_chunk_chars: 0,
        }
    }
}

pub struct SemanticChunker<P> {
    provider: Arc<P>,
    config: ChunkerConfig,
    embed_timeout: Duration,
}

impl<P: LlmProvider> SemanticChunker<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: ChunkerConfig, embed_timeout: Duration) -> Self {
        Self {
            provider,
            config,
            embed_timeout,
        }
    }

    /// Split a document into semantically coherent chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding any sentence window fails.
    pub async fn split(&self, document: &Document) -> Result<Vec<Chunk>, MemoryError> {
        let sentences = split_sentences(&document.content);
        let texts = match sentences.len() {
            0 => return Ok(Vec::new()),
            1 => vec![sentences[0].trim().to_owned()],
            _ => {
                let windows = sentence_windows(&sentences, self.config.buffer_size);
                let mut embeddings = Vec::with_capacity(windows.len());
                for window in &windows {
                    embeddings.push(
                        embed_with_timeout(self.provider.as_ref(), window, self.embed_timeout)
                            .await?,
                    );
                }
                let distances = adjacent_distances(&embeddings);
                let threshold = self.config.breakpoint.threshold(&distances);
                group_sentences(&sentences, &distances, threshold, self.config.min_chunk_chars)
            }
        };

        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Chunk {
                content,
                metadata: document.metadata.clone(),
                chunk_index,
            })
            .collect())
    }
}

/// Split on paragraph breaks and on `.`, `?`, `!` followed by a space.
/// Every character of the input except a whitespace-only tail is kept.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        current.push(chars[i]);

        if chars[i] == '\n' && chars.get(i + 1) == Some(&'\n') {
            current.push('\n');
            i += 1;
            if !current.trim().is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
        } else if matches!(chars[i], '.' | '?' | '!')
            && chars.get(i + 1) == Some(&' ')
            && !current.trim().is_empty()
        {
            sentences.push(std::mem::take(&mut current));
        }

        i += 1;
    }

    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
}

fn sentence_windows(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let start = i.saturating_sub(buffer);
            let end = (i + buffer + 1).min(sentences.len());
            sentences[start..end]
                .iter()
                .map(|s| s.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Cosine distance between each embedding and the next.
#[must_use]
pub fn adjacent_distances(embeddings: &[Vec<f32>]) -> Vec<f32> {
    embeddings
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
        .collect()
}

/// Linear-interpolated percentile, `p` in 0-100. Empty input yields 0.
#[must_use]
pub fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    #[allow(clippy::cast_precision_loss)]
    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    #[allow(clippy::cast_precision_loss)]
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Group sentences, starting a new chunk after sentence `i` when
/// `distances[i] > threshold`. Groups shorter than `min_chars` absorb the
/// following sentences; a short tail joins the previous group.
#[must_use]
pub fn group_sentences(
    sentences: &[String],
    distances: &[f32],
    threshold: f32,
    min_chars: usize,
) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, sentence) in sentences.iter().enumerate() {
        current.push_str(sentence);
        let boundary = distances.get(i).is_some_and(|d| *d > threshold);
        if boundary && current.trim().chars().count() >= min_chars {
            groups.push(std::mem::take(&mut current).trim().to_owned());
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        match groups.last_mut() {
            Some(last) if tail.chars().count() < min_chars => {
                last.push(' ');
                last.push_str(tail);
            }
            _ => groups.push(tail.to_owned()),
        }
    }

    groups
}
