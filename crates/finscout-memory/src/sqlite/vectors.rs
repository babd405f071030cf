use std::collections::HashMap;

use super::SqliteStore;
use crate::vector_store::{
    BoxFuture, BuildMarker, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError, rank,
};

type Payload = HashMap<String, serde_json::Value>;

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, VectorStoreError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorStoreError::Serialization(format!(
            "vector blob of {} bytes is not a whole number of f32",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn to_i64(value: u64) -> Result<i64, VectorStoreError> {
    i64::try_from(value).map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

impl VectorStore for SqliteStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            sqlx::query("INSERT OR IGNORE INTO vector_collections (name, dimensions) VALUES (?, ?)")
                .bind(&collection)
                .bind(to_i64(vector_size)?)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query("DELETE FROM vector_points WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query("DELETE FROM vector_collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            tx.commit()
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            for point in points {
                let payload = serde_json::to_string(&point.payload)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO vector_points (collection, point_id, vector, payload) \
                     VALUES (?, ?, ?, ?) \
                     ON CONFLICT (collection, point_id) \
                     DO UPDATE SET vector = excluded.vector, payload = excluded.payload",
                )
                .bind(&collection)
                .bind(&point.id)
                .bind(encode_vector(&point.vector))
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            }
            tx.commit()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, Vec<u8>, String)> = sqlx::query_as(
                "SELECT point_id, vector, payload FROM vector_points \
                 WHERE collection = ? ORDER BY seq",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let points = rows
                .into_iter()
                .map(|(id, blob, payload)| {
                    let vector = decode_vector(&blob)?;
                    let payload: Payload = serde_json::from_str(&payload)
                        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                    Ok((id, vector, payload))
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()?;

            Ok(rank(&vector, points, limit))
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM vector_points WHERE collection = ?")
                    .bind(&collection)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            u64::try_from(count).map_err(|e| VectorStoreError::Serialization(e.to_string()))
        })
    }

    fn build_marker(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<BuildMarker>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let row: Option<(Option<i64>, i64)> = sqlx::query_as(
                "SELECT built_chunks, dimensions FROM vector_collections WHERE name = ?",
            )
            .bind(&collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

            let Some((Some(chunks), dimensions)) = row else {
                return Ok(None);
            };
            let convert = |v: i64| {
                u64::try_from(v).map_err(|e| VectorStoreError::Serialization(e.to_string()))
            };
            Ok(Some(BuildMarker {
                chunks: convert(chunks)?,
                dimensions: convert(dimensions)?,
            }))
        })
    }

    fn set_build_marker(
        &self,
        collection: &str,
        marker: BuildMarker,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO vector_collections (name, dimensions, built_chunks, built_at) \
                 VALUES (?, ?, ?, CURRENT_TIMESTAMP) \
                 ON CONFLICT (name) DO UPDATE SET \
                 dimensions = excluded.dimensions, \
                 built_chunks = excluded.built_chunks, \
                 built_at = excluded.built_at",
            )
            .bind(&collection)
            .bind(to_i64(marker.dimensions)?)
            .bind(to_i64(marker.chunks)?)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }
}
