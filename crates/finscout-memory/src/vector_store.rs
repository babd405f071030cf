use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Written once a collection has been fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildMarker {
    pub chunks: u64,
    pub dimensions: u64,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage for embedded chunks.
///
/// `search` orders results by descending cosine similarity; ties keep
/// insertion order. Searching a collection that does not exist yields nothing.
pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;

    fn build_marker(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<BuildMarker>, VectorStoreError>>;

    fn set_build_marker(
        &self,
        collection: &str,
        marker: BuildMarker,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score `points` against `query` and keep the best `limit`, stable on ties.
pub(crate) fn rank<I>(query: &[f32], points: I, limit: u64) -> Vec<ScoredVectorPoint>
where
    I: IntoIterator<Item = (String, Vec<f32>, HashMap<String, serde_json::Value>)>,
{
    let mut scored: Vec<ScoredVectorPoint> = points
        .into_iter()
        .map(|(id, vector, payload)| ScoredVectorPoint {
            score: cosine_similarity(query, &vector),
            id,
            payload,
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn rank_is_stable_on_ties() {
        let points = vec![
            ("first".to_owned(), vec![1.0, 0.0], HashMap::new()),
            ("other".to_owned(), vec![0.0, 1.0], HashMap::new()),
            ("second".to_owned(), vec![2.0, 0.0], HashMap::new()),
        ];
        let ranked = rank(&[1.0, 0.0], points, 10);
        let ids: Vec<&str> = ranked.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "other"]);
    }

    #[test]
    fn rank_truncates() {
        let points = (0..5).map(|i| (i.to_string(), vec![1.0], HashMap::new()));
        assert_eq!(rank(&[1.0], points, 2).len(), 2);
    }
}
