use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::{AnalysisId, AnalysisRecord, AnalysisStatus};

impl SqliteStore {
    /// Persist a reviewed report. The timestamp is assigned by the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn save_analysis(
        &self,
        source: &str,
        report: &str,
        status: AnalysisStatus,
    ) -> Result<AnalysisId, MemoryError> {
        let id: AnalysisId = sqlx::query_scalar(
            "INSERT INTO analyses (source, report, status) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(source)
        .bind(report)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(%id, %status, "saved analysis for {source}");
        Ok(id)
    }

    /// All persisted analyses, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds an unknown status.
    pub async fn list_analyses(&self) -> Result<Vec<AnalysisRecord>, MemoryError> {
        self.fetch_analyses(None).await
    }

    /// The `limit` newest analyses.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds an unknown status.
    pub async fn recent_analyses(&self, limit: i64) -> Result<Vec<AnalysisRecord>, MemoryError> {
        self.fetch_analyses(Some(limit)).await
    }

    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds an unknown status.
    pub async fn get_analysis(
        &self,
        id: AnalysisId,
    ) -> Result<Option<AnalysisRecord>, MemoryError> {
        let row: Option<(AnalysisId, String, String, String, String)> = sqlx::query_as(
            "SELECT id, source, report, status, created_at FROM analyses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_record).transpose()
    }

    async fn fetch_analyses(&self, limit: Option<i64>) -> Result<Vec<AnalysisRecord>, MemoryError> {
        let rows: Vec<(AnalysisId, String, String, String, String)> = sqlx::query_as(
            "SELECT id, source, report, status, created_at FROM analyses \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_record).collect()
    }
}

fn into_record(
    (id, source, report, status, created_at): (AnalysisId, String, String, String, String),
) -> Result<AnalysisRecord, MemoryError> {
    Ok(AnalysisRecord {
        id,
        source,
        report,
        status: status.parse()?,
        created_at,
    })
}
