use super::PipelineError;
use super::step::Step;

pub trait Runnable: Send + Sync {
    type Input: Send;
    type Output: Send;

    /// Number of steps in the chain.
    fn step_count(&self) -> usize;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<Self::Output, PipelineError>> + Send;
}

pub struct Start<S>(S);

impl<S: Step> Runnable for Start<S> {
    type Input = S::Input;
    type Output = S::Output;

    fn step_count(&self) -> usize {
        1
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        run_logged(&self.0, input, 1).await
    }
}

pub struct Chain<Prev, Current> {
    prev: Prev,
    current: Current,
}

impl<Prev, Current> Runnable for Chain<Prev, Current>
where
    Prev: Runnable,
    Current: Step<Input = Prev::Output>,
{
    type Input = Prev::Input;
    type Output = Current::Output;

    fn step_count(&self) -> usize {
        self.prev.step_count() + 1
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        let intermediate = self.prev.run(input).await?;
        run_logged(&self.current, intermediate, self.step_count()).await
    }
}

async fn run_logged<S: Step>(
    step: &S,
    input: S::Input,
    position: usize,
) -> Result<S::Output, PipelineError> {
    let started = std::time::Instant::now();
    tracing::debug!(step = step.name(), position, "step started");
    let result = step.run(input).await;
    match &result {
        Ok(_) => tracing::debug!(
            step = step.name(),
            elapsed_ms = started.elapsed().as_millis(),
            "step finished"
        ),
        Err(e) => tracing::debug!(step = step.name(), "step failed: {e}"),
    }
    result
}

/// Statically typed sequence of steps. A failing step stops the sequence;
/// later steps never run.
pub struct Pipeline<S> {
    steps: S,
}

impl Pipeline<()> {
    #[must_use]
    pub fn start<S: Step>(step: S) -> Pipeline<Start<S>> {
        Pipeline { steps: Start(step) }
    }
}

impl<S> Pipeline<S> {
    #[must_use]
    pub fn step<T: Step>(self, step: T) -> Pipeline<Chain<S, T>> {
        Pipeline {
            steps: Chain {
                prev: self.steps,
                current: step,
            },
        }
    }
}

impl<S: Runnable> Pipeline<S> {
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.step_count()
    }

    /// # Errors
    ///
    /// Returns the error of the first step that fails.
    pub async fn run(&self, input: S::Input) -> Result<S::Output, PipelineError> {
        self.steps.run(input).await
    }
}
