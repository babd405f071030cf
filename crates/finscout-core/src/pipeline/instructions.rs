//! The fixed four-stage analysis plan.

use finscout_tools::SourceReference;

use super::capability::CapabilityKind;
use super::stage::{ExtractionPolicy, Stage, StageId, StageInput};

pub const EXECUTIVE_SUMMARY: &str = "Executive Summary";
pub const KEY_RISKS: &str = "Key Risks";
pub const ACTION_PLAN: &str = "Action Plan by Department";
pub const CORRECTIONS: &str = "Corrections Made";

/// Knobs the plan takes from configuration.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub organization: String,
    pub min_distinct_queries: usize,
}

/// Interpret, Impact, Strategy, Verify, in run order.
#[must_use]
pub fn standard_plan(source: &SourceReference, settings: &PlanSettings) -> [Stage; 4] {
    [
        interpret(source),
        impact(settings),
        strategy(settings),
        verify(),
    ]
}

fn interpret(source: &SourceReference) -> Stage {
    let (steps, policy) = match source {
        SourceReference::File { path } => (
            format!(
                "The source is a local PDF file. Read it with read_pdf using the path \"{}\".",
                path.display()
            ),
            ExtractionPolicy::Continue,
        ),
        SourceReference::Url {
            address,
            selector: Some(selector),
        } => (
            format!(
                "The source is a web page whose content selector is known. Read it with scrape_page \
                 using the url \"{address}\" and the selector \"{selector}\"."
            ),
            ExtractionPolicy::Abort,
        ),
        SourceReference::Url {
            address,
            selector: None,
        } => (
            format!(
                "The source is the web page \"{address}\". First call inspect_page to find the CSS \
                 selector of the main content (for example div#content or article.main), then \
                 call scrape_page with the url and that selector to get clean text. If a selector \
                 yields nothing useful, try another candidate."
            ),
            ExtractionPolicy::Continue,
        ),
    };

    Stage::new(
        StageId::Interpret,
        "Regulatory Interpreter",
        "Read regulatory documents from web pages or PDFs and interpret their core meaning. \
         You are an expert legal analyst who extracts the key points of dense legal text.",
    )
    .with_capabilities(&[
        CapabilityKind::ReadPdf,
        CapabilityKind::InspectPage,
        CapabilityKind::ScrapePage,
    ])
    .reading(&[StageInput::Source])
    .requiring_capability(&[CapabilityKind::ReadPdf, CapabilityKind::ScrapePage])
    .with_instructions(format!(
        "{steps}\nThen provide a concise summary of the key regulatory changes it introduces."
    ))
    .producing("A bullet-point summary of the core regulatory changes in the extracted text.")
    .on_extraction_failure(policy)
}

fn impact(settings: &PlanSettings) -> Stage {
    let org = &settings.organization;
    Stage::new(
        StageId::Impact,
        "Business Impact Analyst",
        format!(
            "Analyse how regulatory changes affect the products, operations, and technical \
             infrastructure of {org}. You know its products and systems and connect each change \
             to specific business operations using the company knowledge base."
        ),
    )
    .with_capabilities(&[CapabilityKind::SearchKnowledgeBase])
    .reading(&[StageInput::Stage(StageId::Interpret)])
    .with_instructions(format!(
        "Using the summary of regulatory changes below, analyse the specific impact on {org}. \
         Ask search_knowledge_base several specific questions about the company's products and \
         processes, for example \"What is our current KYC process?\" or \"What is our data \
         storage policy?\". Ask at least {} distinct questions, then synthesise what you found.",
        settings.min_distinct_queries
    ))
    .producing(
        "A detailed analysis of how each change affects specific parts of the company, citing the \
         knowledge base passages it relies on.",
    )
    .requiring_queries(settings.min_distinct_queries)
}

fn strategy(settings: &PlanSettings) -> Stage {
    Stage::new(
        StageId::Strategy,
        "Strategy and Compliance Advisor",
        format!(
            "Create a prioritised, actionable compliance plan for {} with clear departmental \
             owners. You translate regulatory language into concrete operational and engineering \
             tasks with estimated timelines.",
            settings.organization
        ),
    )
    .reading(&[StageInput::Stage(StageId::Impact)])
    .with_instructions(format!(
        "Based on the impact analysis below, create a high-level, actionable strategic plan. \
         Outline prioritised next steps for the key departments (for example Engineering, \
         Operations, Legal). Structure the report in Markdown with exactly these sections: \
         1. {EXECUTIVE_SUMMARY}, 2. {KEY_RISKS}, 3. {ACTION_PLAN}."
    ))
    .producing(format!(
        "A Markdown report with the sections {EXECUTIVE_SUMMARY}, {KEY_RISKS} and {ACTION_PLAN}."
    ))
}

fn verify() -> Stage {
    Stage::new(
        StageId::Verify,
        "Verification Specialist",
        "Verify the strategic plan against the initial regulatory summary for consistency and \
         accuracy. Every recommendation must be supported by the interpretation of the regulation.",
    )
    .reading(&[
        StageInput::Stage(StageId::Interpret),
        StageInput::Stage(StageId::Impact),
        StageInput::Stage(StageId::Strategy),
    ])
    .with_instructions(format!(
        "Review the entire analysis below. Compare the regulatory summary from the interpret \
         stage with the strategic plan. If everything is consistent, return the strategic plan \
         unchanged followed by a line stating that the report was verified. If there are \
         inconsistencies or unsupported claims, return a corrected report that keeps the \
         {EXECUTIVE_SUMMARY}, {KEY_RISKS} and {ACTION_PLAN} sections and adds a \
         \"{CORRECTIONS}\" section listing each correction."
    ))
    .producing(format!(
        "The final verified report, including a \"{CORRECTIONS}\" section when anything was changed."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PlanSettings {
        PlanSettings {
            organization: "FlexiPay India".into(),
            min_distinct_queries: 2,
        }
    }

    #[test]
    fn plan_order_and_dependencies() {
        let plan = standard_plan(&SourceReference::parse("notice.pdf"), &settings());
        let ids: Vec<_> = plan.iter().map(|s| s.id).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
        assert_eq!(plan[0].reads, vec![StageInput::Source]);
        assert_eq!(plan[1].reads, vec![StageInput::Stage(StageId::Interpret)]);
        assert_eq!(plan[2].reads, vec![StageInput::Stage(StageId::Impact)]);
        assert_eq!(plan[3].reads.len(), 3);
    }

    #[test]
    fn only_first_two_stages_have_capabilities() {
        let plan = standard_plan(&SourceReference::parse("notice.pdf"), &settings());
        assert_eq!(plan[0].capabilities.len(), 3);
        assert_eq!(plan[1].capabilities, vec![CapabilityKind::SearchKnowledgeBase]);
        assert!(plan[2].capabilities.is_empty());
        assert!(plan[3].capabilities.is_empty());
        assert_eq!(plan[1].min_distinct_queries, 2);
    }

    #[test]
    fn interpret_must_extract_before_answering() {
        let plan = standard_plan(&SourceReference::parse("notice.pdf"), &settings());
        assert_eq!(
            plan[0].required_capabilities,
            vec![CapabilityKind::ReadPdf, CapabilityKind::ScrapePage]
        );
        assert!(plan[1..].iter().all(|s| s.required_capabilities.is_empty()));
    }

    #[test]
    fn explicit_selector_aborts_on_extraction_failure() {
        let source = SourceReference::parse("https://rbi.example/n").with_selector("main");
        let plan = standard_plan(&source, &settings());
        assert_eq!(plan[0].on_extraction_failure, ExtractionPolicy::Abort);
        assert!(plan[0].instructions.contains("\"main\""));
    }

    #[test]
    fn discovery_continues_on_extraction_failure() {
        let plan = standard_plan(&SourceReference::parse("https://rbi.example/n"), &settings());
        assert_eq!(plan[0].on_extraction_failure, ExtractionPolicy::Continue);
        assert!(plan[0].instructions.contains("inspect_page"));
    }

    #[test]
    fn strategy_names_report_sections() {
        let plan = standard_plan(&SourceReference::parse("notice.pdf"), &settings());
        for section in [EXECUTIVE_SUMMARY, KEY_RISKS, ACTION_PLAN] {
            assert!(plan[2].instructions.contains(section));
        }
        assert!(plan[3].instructions.contains(CORRECTIONS));
        assert!(plan[1].goal.contains("FlexiPay India"));
    }
}
