//! Capabilities a stage may invoke from inside its reason-act loop.
//!
//! The model invokes a capability with a fenced block tagged with the
//! capability name and holding a JSON argument object:
//!
//! ````text
//! ```search_knowledge_base
//! {"query": "What is our KYC process?"}
//! ```
//! ````

use std::fmt::{self, Write};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use finscout_llm::LlmProvider;
use finscout_memory::RetrievalGateway;
use finscout_tools::{Browser, ContentExtractor, ExtractionError, extract_fenced_blocks, html};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    ReadPdf,
    InspectPage,
    ScrapePage,
    SearchKnowledgeBase,
}

impl CapabilityKind {
    pub const ALL: [Self; 4] = [
        Self::ReadPdf,
        Self::InspectPage,
        Self::ScrapePage,
        Self::SearchKnowledgeBase,
    ];

    /// Fence tag that invokes the capability.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::ReadPdf => "read_pdf",
            Self::InspectPage => "inspect_page",
            Self::ScrapePage => "scrape_page",
            Self::SearchKnowledgeBase => "search_knowledge_base",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::ReadPdf => "Read the text of every page of a local PDF file, in page order.",
            Self::InspectPage => {
                "Load a web page and list CSS selectors that hold substantial text, with a preview of each."
            }
            Self::ScrapePage => {
                "Load a web page and return the visible text inside the element matched by a CSS selector."
            }
            Self::SearchKnowledgeBase => {
                "Search the company knowledge base about its products, infrastructure, and processes. \
                 Ask one specific question per call."
            }
        }
    }

    #[must_use]
    pub fn schema(self) -> schemars::Schema {
        match self {
            Self::ReadPdf => schemars::schema_for!(ReadPdfArgs),
            Self::InspectPage => schemars::schema_for!(InspectPageArgs),
            Self::ScrapePage => schemars::schema_for!(ScrapePageArgs),
            Self::SearchKnowledgeBase => schemars::schema_for!(SearchArgs),
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ReadPdfArgs {
    /// Path of the PDF file
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct InspectPageArgs {
    /// HTTP(S) URL of the page
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ScrapePageArgs {
    /// HTTP(S) URL of the page
    pub url: String,
    /// CSS selector of the element holding the content
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Question to answer from the knowledge base
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityCall {
    ReadPdf(ReadPdfArgs),
    InspectPage(InspectPageArgs),
    ScrapePage(ScrapePageArgs),
    SearchKnowledgeBase(SearchArgs),
}

impl CapabilityCall {
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::ReadPdf(_) => CapabilityKind::ReadPdf,
            Self::InspectPage(_) => CapabilityKind::InspectPage,
            Self::ScrapePage(_) => CapabilityKind::ScrapePage,
            Self::SearchKnowledgeBase(_) => CapabilityKind::SearchKnowledgeBase,
        }
    }

    fn from_json(kind: CapabilityKind, body: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            CapabilityKind::ReadPdf => Self::ReadPdf(serde_json::from_str(body)?),
            CapabilityKind::InspectPage => Self::InspectPage(serde_json::from_str(body)?),
            CapabilityKind::ScrapePage => Self::ScrapePage(serde_json::from_str(body)?),
            CapabilityKind::SearchKnowledgeBase => {
                Self::SearchKnowledgeBase(serde_json::from_str(body)?)
            }
        })
    }
}

/// A fenced invocation found in a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: CapabilityKind,
    /// Parsed arguments, or the reason they could not be parsed.
    pub call: Result<CapabilityCall, String>,
}

/// Find every capability invocation in `response`, grouped by capability.
#[must_use]
pub fn parse_invocations(response: &str) -> Vec<Invocation> {
    let mut found = Vec::new();
    for kind in CapabilityKind::ALL {
        for body in extract_fenced_blocks(response, kind.tag()) {
            let call = CapabilityCall::from_json(kind, body).map_err(|e| e.to_string());
            found.push(Invocation { kind, call });
        }
    }
    found
}

/// Why a capability produced no usable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityFailure {
    Extraction(ExtractionError),
    /// The knowledge base had nothing relevant. Not an error for the run.
    RetrievalEmpty,
    InvalidArguments(String),
    NotPermitted,
    Backend(String),
}

impl fmt::Display for CapabilityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction(e) => write!(f, "{e}"),
            Self::RetrievalEmpty => {
                f.write_str("no supporting evidence found in the knowledge base for this query")
            }
            Self::InvalidArguments(reason) => write!(f, "invalid arguments: {reason}"),
            Self::NotPermitted => f.write_str("this capability is not available in this stage"),
            Self::Backend(reason) => write!(f, "capability failed: {reason}"),
        }
    }
}

/// Result of one invocation, fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub kind: CapabilityKind,
    pub outcome: Result<String, CapabilityFailure>,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(text) => write!(f, "Observation from {}:\n{text}", self.kind),
            Err(failure) => write!(f, "Observation from {} (error):\n{failure}", self.kind),
        }
    }
}

/// Runs capability calls on behalf of the stage runner.
pub trait CapabilityExecutor: Send + Sync {
    fn execute(
        &self,
        call: &CapabilityCall,
    ) -> impl Future<Output = Result<String, CapabilityFailure>> + Send;
}

/// Capabilities backed by the content extractor and the retrieval gateway.
pub struct Toolbox<B, P> {
    extractor: Arc<ContentExtractor<B>>,
    retrieval: Arc<RetrievalGateway<P>>,
}

impl<B, P> Toolbox<B, P> {
    #[must_use]
    pub fn new(extractor: Arc<ContentExtractor<B>>, retrieval: Arc<RetrievalGateway<P>>) -> Self {
        Self {
            extractor,
            retrieval,
        }
    }
}

impl<B, P> CapabilityExecutor for Toolbox<B, P>
where
    B: Browser,
    P: LlmProvider,
{
    async fn execute(&self, call: &CapabilityCall) -> Result<String, CapabilityFailure> {
        match call {
            CapabilityCall::ReadPdf(args) => self
                .extractor
                .read_pdf(Path::new(&args.path))
                .await
                .map_err(CapabilityFailure::Extraction),
            CapabilityCall::InspectPage(args) => {
                let candidates = self
                    .extractor
                    .inspect(&args.url)
                    .await
                    .map_err(CapabilityFailure::Extraction)?;
                Ok(html::format_outline(&args.url, &candidates))
            }
            CapabilityCall::ScrapePage(args) => self
                .extractor
                .scrape(&args.url, &args.selector)
                .await
                .map_err(CapabilityFailure::Extraction),
            CapabilityCall::SearchKnowledgeBase(args) => {
                let context = self
                    .retrieval
                    .retrieve(&args.query)
                    .await
                    .map_err(|e| CapabilityFailure::Backend(e.to_string()))?;
                if context.is_empty() {
                    Err(CapabilityFailure::RetrievalEmpty)
                } else {
                    Ok(context)
                }
            }
        }
    }
}

/// Describe `capabilities` for a system prompt.
#[must_use]
pub fn format_for_prompt(capabilities: &[CapabilityKind]) -> String {
    let mut out = String::from("<capabilities>\n");
    for kind in capabilities {
        let _ = writeln!(out, "## {kind}");
        let _ = writeln!(out, "{}", kind.description());
        let _ = writeln!(out, "Invocation: use ```{} fenced block with a JSON object", kind.tag());
        format_schema_params(&mut out, &kind.schema());
        out.push('\n');
    }
    out.push_str("</capabilities>");
    out
}

fn format_schema_params(out: &mut String, schema: &schemars::Schema) {
    let Some(obj) = schema.as_object() else {
        return;
    };
    let Some(serde_json::Value::Object(props)) = obj.get("properties") else {
        return;
    };

    let required: Vec<&str> = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let _ = writeln!(out, "Arguments:");
    for (name, prop) in props {
        let prop_obj = prop.as_object();
        let ty = prop_obj
            .and_then(|o| o.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("string");
        let desc = prop_obj
            .and_then(|o| o.get("description"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let req = if required.contains(&name.as_str()) {
            "required"
        } else {
            "optional"
        };
        let _ = writeln!(out, "  - {name}: {desc} ({ty}, {req})");
    }
}
