//! Stage definitions and the context that flows between them.

use std::collections::BTreeMap;
use std::fmt;

use finscout_tools::SourceReference;

use super::capability::CapabilityKind;
use super::{PipelineError, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    Interpret,
    Impact,
    Strategy,
    Verify,
}

impl StageId {
    pub const ALL: [Self; 4] = [Self::Interpret, Self::Impact, Self::Strategy, Self::Verify];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interpret => "interpret",
            Self::Impact => "impact",
            Self::Strategy => "strategy",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a stage is allowed to read before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// The source reference the run was started with.
    Source,
    /// The output of an earlier stage.
    Stage(StageId),
}

/// What a stage does when a capability fails to extract content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionPolicy {
    /// Show the failure to the model as an observation.
    #[default]
    Continue,
    /// Fail the run with the extraction error.
    Abort,
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub role: String,
    pub goal: String,
    pub capabilities: Vec<CapabilityKind>,
    pub reads: Vec<StageInput>,
    pub instructions: String,
    /// Description of the expected output, shown to the model.
    pub produces: String,
    /// Distinct knowledge-base queries required before a final answer is accepted.
    pub min_distinct_queries: usize,
    /// A final answer is refused until one of these has succeeded.
    pub required_capabilities: Vec<CapabilityKind>,
    pub on_extraction_failure: ExtractionPolicy,
}

impl Stage {
    #[must_use]
    pub fn new(id: StageId, role: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
            goal: goal.into(),
            capabilities: Vec::new(),
            reads: Vec::new(),
            instructions: String::new(),
            produces: String::new(),
            min_distinct_queries: 0,
            required_capabilities: Vec::new(),
            on_extraction_failure: ExtractionPolicy::Continue,
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[CapabilityKind]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    #[must_use]
    pub fn reading(mut self, reads: &[StageInput]) -> Self {
        self.reads = reads.to_vec();
        self
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn producing(mut self, produces: impl Into<String>) -> Self {
        self.produces = produces.into();
        self
    }

    #[must_use]
    pub fn requiring_queries(mut self, n: usize) -> Self {
        self.min_distinct_queries = n;
        self
    }

    #[must_use]
    pub fn requiring_capability(mut self, any_of: &[CapabilityKind]) -> Self {
        self.required_capabilities = any_of.to_vec();
        self
    }

    #[must_use]
    pub fn on_extraction_failure(mut self, policy: ExtractionPolicy) -> Self {
        self.on_extraction_failure = policy;
        self
    }

    #[must_use]
    pub fn allows(&self, kind: CapabilityKind) -> bool {
        self.capabilities.contains(&kind)
    }
}

/// Outputs produced so far in a run, keyed by stage. Entries are never
/// replaced.
#[derive(Debug, Clone)]
pub struct StageContext {
    source: SourceReference,
    outputs: BTreeMap<StageId, String>,
}

impl StageContext {
    #[must_use]
    pub fn new(source: SourceReference) -> Self {
        Self {
            source,
            outputs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &SourceReference {
        &self.source
    }

    #[must_use]
    pub fn get(&self, id: StageId) -> Option<&str> {
        self.outputs.get(&id).map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateOutput`] if `id` already produced output.
    pub fn insert(&mut self, id: StageId, output: String) -> Result<(), PipelineError> {
        if self.outputs.contains_key(&id) {
            return Err(PipelineError::DuplicateOutput { stage: id });
        }
        self.outputs.insert(id, output);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Render the inputs `reads` names, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingInput`] when a named stage has not run.
    pub fn render_inputs(&self, reads: &[StageInput]) -> Result<String, StageError> {
        let mut sections = Vec::with_capacity(reads.len());
        for input in reads {
            match input {
                StageInput::Source => {
                    sections.push(format!("### Source\n{}", describe_source(&self.source)));
                }
                StageInput::Stage(id) => {
                    let output = self.get(*id).ok_or(StageError::MissingInput(*id))?;
                    sections.push(format!("### Output of the {id} stage\n{output}"));
                }
            }
        }
        Ok(sections.join("\n\n"))
    }
}

fn describe_source(source: &SourceReference) -> String {
    match source {
        SourceReference::File { path } => format!("Local PDF file: {}", path.display()),
        SourceReference::Url {
            address,
            selector: Some(selector),
        } => format!("Web page: {address}\nContent selector: {selector}"),
        SourceReference::Url {
            address,
            selector: None,
        } => format!("Web page: {address}\nContent selector: unknown, inspect the page first"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded(String),
    Failed(String),
}

impl StageState {
    /// One-line description for display.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Pending => "not run".to_owned(),
            Self::Running => "running".to_owned(),
            Self::Succeeded(output) => format!("succeeded ({} chars)", output.len()),
            Self::Failed(error) => format!("failed: {error}"),
        }
    }
}

/// Per-stage state of one run, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTrace {
    entries: Vec<(StageId, StageState)>,
}

impl StageTrace {
    #[must_use]
    pub fn pending(stages: &[StageId]) -> Self {
        Self {
            entries: stages.iter().map(|id| (*id, StageState::Pending)).collect(),
        }
    }

    pub fn mark(&mut self, id: StageId, state: StageState) {
        if let Some(entry) = self.entries.iter_mut().find(|(stage, _)| *stage == id) {
            entry.1 = state;
        } else {
            self.entries.push((id, state));
        }
    }

    #[must_use]
    pub fn state(&self, id: StageId) -> Option<&StageState> {
        self.entries
            .iter()
            .find(|(stage, _)| *stage == id)
            .map(|(_, state)| state)
    }

    #[must_use]
    pub fn entries(&self) -> &[(StageId, StageState)] {
        &self.entries
    }

    /// Stages that left the `Pending` state.
    #[must_use]
    pub fn executed(&self) -> Vec<StageId> {
        self.entries
            .iter()
            .filter(|(_, state)| *state != StageState::Pending)
            .map(|(id, _)| *id)
            .collect()
    }
}
