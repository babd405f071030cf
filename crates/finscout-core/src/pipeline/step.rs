use std::future::Future;

use super::PipelineError;

/// One unit of a [`Pipeline`](super::Pipeline): consumes the previous step's
/// output and produces the next step's input.
pub trait Step: Send + Sync {
    type Input: Send;
    type Output: Send;

    /// Label used in logs.
    fn name(&self) -> &str;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, PipelineError>> + Send;
}
