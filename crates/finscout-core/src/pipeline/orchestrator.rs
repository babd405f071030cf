use std::sync::{Mutex, PoisonError};

use finscout_llm::LlmProvider;
use finscout_tools::SourceReference;

use super::builder::Pipeline;
use super::capability::CapabilityExecutor;
use super::instructions::{PlanSettings, standard_plan};
use super::runner::StageRunner;
use super::stage::{Stage, StageContext, StageId, StageState, StageTrace};
use super::step::Step;
use super::{PipelineError, StageError};

/// Runs the four-stage plan over one source.
pub struct AnalysisPipeline<E, P> {
    runner: StageRunner<E, P>,
    settings: PlanSettings,
}

impl<E, P> AnalysisPipeline<E, P>
where
    E: CapabilityExecutor,
    P: LlmProvider,
{
    #[must_use]
    pub fn new(runner: StageRunner<E, P>, settings: PlanSettings) -> Self {
        Self { runner, settings }
    }

    /// Analyse `source` and return the verified report.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails. Later stages do not run.
    pub async fn run(&self, source: &SourceReference) -> Result<String, PipelineError> {
        self.run_with_trace(source).await.0
    }

    /// Like [`Self::run`], also returning the state each stage ended in.
    pub async fn run_with_trace(
        &self,
        source: &SourceReference,
    ) -> (Result<String, PipelineError>, StageTrace) {
        let [interpret, impact, strategy, verify] = standard_plan(source, &self.settings);
        let trace = Mutex::new(StageTrace::pending(&StageId::ALL));

        let pipeline = Pipeline::start(self.stage_step(interpret, &trace))
            .step(self.stage_step(impact, &trace))
            .step(self.stage_step(strategy, &trace))
            .step(self.stage_step(verify, &trace));

        tracing::info!(%source, stages = pipeline.step_count(), "analysis started");
        let result = pipeline
            .run(StageContext::new(source.clone()))
            .await
            .and_then(|context| {
                context
                    .get(StageId::Verify)
                    .map(str::to_owned)
                    .ok_or(PipelineError::StageFailed {
                        stage: StageId::Verify,
                        error: StageError::MissingInput(StageId::Verify),
                    })
            });
        match &result {
            Ok(report) => tracing::info!(%source, chars = report.len(), "analysis finished"),
            Err(e) => tracing::warn!(%source, stage = %e.stage(), "analysis failed: {e}"),
        }

        drop(pipeline);
        let trace = trace.into_inner().unwrap_or_else(PoisonError::into_inner);
        (result, trace)
    }

    fn stage_step<'a>(&'a self, stage: Stage, trace: &'a Mutex<StageTrace>) -> StageStep<'a, E, P> {
        StageStep {
            runner: &self.runner,
            stage,
            trace,
        }
    }
}

struct StageStep<'a, E, P> {
    runner: &'a StageRunner<E, P>,
    stage: Stage,
    trace: &'a Mutex<StageTrace>,
}

impl<E, P> StageStep<'_, E, P> {
    fn mark(&self, state: StageState) {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark(self.stage.id, state);
    }
}

impl<E, P> Step for StageStep<'_, E, P>
where
    E: CapabilityExecutor,
    P: LlmProvider,
{
    type Input = StageContext;
    type Output = StageContext;

    fn name(&self) -> &str {
        self.stage.id.as_str()
    }

    async fn run(&self, mut context: StageContext) -> Result<StageContext, PipelineError> {
        self.mark(StageState::Running);
        tracing::info!(stage = %self.stage.id, "stage started");
        match self.runner.execute(&self.stage, &context).await {
            Ok(output) => {
                self.mark(StageState::Succeeded(output.clone()));
                context.insert(self.stage.id, output)?;
                Ok(context)
            }
            Err(e) => {
                self.mark(StageState::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}
