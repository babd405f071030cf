//! Human review of a finished report.
//!
//! Only reports a reviewer approved or flagged are persisted.

use std::fmt;
use std::str::FromStr;

use finscout_memory::{AnalysisId, AnalysisStatus, MemoryError, SqliteStore};
use finscout_tools::SourceReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Flag,
    Discard,
}

impl ReviewDecision {
    pub const ALL: [Self; 3] = [Self::Approve, Self::Flag, Self::Discard];

    /// Status to persist with, or `None` when the report is dropped.
    #[must_use]
    pub fn status(self) -> Option<AnalysisStatus> {
        match self {
            Self::Approve => Some(AnalysisStatus::Approved),
            Self::Flag => Some(AnalysisStatus::Flagged),
            Self::Discard => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Approve => "Approve and save",
            Self::Flag => "Flag for follow-up and save",
            Self::Discard => "Discard",
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Flag => "flag",
            Self::Discard => "discard",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown review decision '{0}', expected approve, flag or discard")]
pub struct UnknownDecision(String);

impl FromStr for ReviewDecision {
    type Err = UnknownDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" | "a" => Ok(Self::Approve),
            "flag" | "flagged" | "f" => Ok(Self::Flag),
            "discard" | "d" => Ok(Self::Discard),
            _ => Err(UnknownDecision(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Saved { id: AnalysisId, status: AnalysisStatus },
    Discarded,
}

/// Apply `decision` to `report`: persist it with the matching status, or drop it.
///
/// # Errors
///
/// Returns an error if saving fails.
pub async fn record_review(
    store: &SqliteStore,
    source: &SourceReference,
    report: &str,
    decision: ReviewDecision,
) -> Result<ReviewOutcome, MemoryError> {
    let Some(status) = decision.status() else {
        tracing::info!(%source, "report discarded by reviewer");
        return Ok(ReviewOutcome::Discarded);
    };
    let id = store
        .save_analysis(&source.to_string(), report, status)
        .await?;
    Ok(ReviewOutcome::Saved { id, status })
}
