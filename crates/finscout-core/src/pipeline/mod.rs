//! The staged analysis pipeline.
//!
//! Four stages run in a fixed order over a shared [`StageContext`]. Each
//! stage is a bounded reason-act loop ([`StageRunner`]) that may invoke the
//! capabilities it was granted; [`AnalysisPipeline`] chains them with the
//! [`Pipeline`] builder so the first failure stops the run.

pub mod builder;
pub mod capability;
pub mod instructions;
pub mod orchestrator;
pub mod runner;
pub mod stage;
pub mod step;

pub use builder::Pipeline;
pub use capability::{
    CapabilityCall, CapabilityExecutor, CapabilityFailure, CapabilityKind, Toolbox,
};
pub use orchestrator::AnalysisPipeline;
pub use runner::StageRunner;
pub use stage::{ExtractionPolicy, Stage, StageContext, StageId, StageInput, StageState, StageTrace};
pub use step::Step;

use finscout_llm::LlmError;
use finscout_tools::ExtractionError;

/// Failure inside a single stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("input from the {0} stage is not available")]
    MissingInput(StageId),
}

/// Why a run stopped before producing a report.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage '{stage}' failed: {error}")]
    StageFailed { stage: StageId, error: StageError },

    #[error("stage '{stage}' gave no final answer within {turns} turns")]
    StageNonTerminating { stage: StageId, turns: usize },

    /// Extraction failure in a stage whose policy is to abort. Displays the
    /// extraction error unchanged.
    #[error("{error}")]
    Extraction { stage: StageId, error: ExtractionError },

    #[error("stage '{stage}' already produced output")]
    DuplicateOutput { stage: StageId },
}

impl PipelineError {
    /// Stage the run stopped in.
    #[must_use]
    pub fn stage(&self) -> StageId {
        match self {
            Self::StageFailed { stage, .. }
            | Self::StageNonTerminating { stage, .. }
            | Self::Extraction { stage, .. }
            | Self::DuplicateOutput { stage } => *stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct AddSuffix {
        suffix: String,
    }

    impl Step for AddSuffix {
        type Input = String;
        type Output = String;

        fn name(&self) -> &str {
            "add_suffix"
        }

        async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
            Ok(format!("{input}{}", self.suffix))
        }
    }

    struct ParseLen;

    impl Step for ParseLen {
        type Input = String;
        type Output = usize;

        fn name(&self) -> &str {
            "parse_len"
        }

        async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
            Ok(input.len())
        }
    }

    struct Fail;

    impl Step for Fail {
        type Input = String;
        type Output = String;

        fn name(&self) -> &str {
            "fail"
        }

        async fn run(&self, _input: Self::Input) -> Result<Self::Output, PipelineError> {
            Err(PipelineError::StageNonTerminating {
                stage: StageId::Impact,
                turns: 3,
            })
        }
    }

    #[tokio::test]
    async fn chained_steps_change_type() {
        let pipeline = Pipeline::start(AddSuffix {
            suffix: "-abc".into(),
        })
        .step(ParseLen);
        assert_eq!(pipeline.step_count(), 2);
        assert_eq!(pipeline.run("x".into()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn failure_stops_later_steps() {
        let pipeline = Pipeline::start(AddSuffix { suffix: "!".into() })
            .step(Fail)
            .step(ParseLen);
        let err = pipeline.run("x".into()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageNonTerminating {
                stage: StageId::Impact,
                turns: 3
            }
        ));
    }

    #[test]
    fn extraction_error_displays_verbatim() {
        let inner = ExtractionError::SelectorNotFound {
            selector: "#missing".into(),
            url: "https://rbi.example/notice".into(),
            timeout: Duration::from_secs(10),
        };
        let err = PipelineError::Extraction {
            stage: StageId::Interpret,
            error: inner.clone(),
        };
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.stage(), StageId::Interpret);
    }

    #[test]
    fn stage_failure_names_stage() {
        let err = PipelineError::StageFailed {
            stage: StageId::Strategy,
            error: StageError::Llm(LlmError::Timeout {
                operation: "chat",
                seconds: 120,
            }),
        };
        assert_eq!(
            err.to_string(),
            "stage 'strategy' failed: chat timed out after 120s"
        );
    }
}
