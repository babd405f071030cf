//! Configuration, the staged analysis pipeline, human review, and startup
//! wiring for finscout.

pub mod bootstrap;
pub mod config;
pub mod pipeline;
pub mod review;

pub use bootstrap::{App, AppBuilder};
pub use config::Config;
pub use pipeline::{AnalysisPipeline, PipelineError, StageError, StageId, StageTrace};
pub use review::{ReviewDecision, ReviewOutcome};
