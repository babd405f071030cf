use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use finscout_core::bootstrap::App;
use finscout_core::pipeline::StageState;
use finscout_core::{Config, PipelineError, ReviewDecision, ReviewOutcome, StageId};
use finscout_llm::mock::MockProvider;
use finscout_memory::{AnalysisStatus, BuildOutcome, SqliteStore};
use finscout_tools::mock::{MockBrowser, minimal_pdf};
use finscout_tools::{ExtractionError, SourceReference};

const CORPUS_KYC: &str = "# KYC Process\n\n\
    FlexiUPI onboarding verifies customers with Aadhaar OTP. Full accounts require video KYC \
    performed by the operations team within 24 hours of signup.\n";

const CORPUS_STORAGE: &str = "# Data Storage Policy\n\n\
    Payment data for Indian customers is stored in the Mumbai region. Backups are replicated \
    to Singapore every night.\n";

const NOTICE_PAGE: &str = "<html><body><nav>Home | Circulars</nav>\
    <div id=\"content\"><h1>Master Direction on KYC</h1>\
    <p>Regulated entities shall complete video KYC within 3 days.</p></div></body></html>";

struct Harness {
    app: App<MockProvider, MockBrowser>,
    provider: MockProvider,
    _corpus: tempfile::TempDir,
}

async fn harness(
    responses: &[String],
    browser: MockBrowser,
    tweak: impl FnOnce(&mut Config),
) -> Harness {
    let corpus = tempfile::tempdir().unwrap();
    std::fs::write(corpus.path().join("kyc.md"), CORPUS_KYC).unwrap();
    std::fs::create_dir(corpus.path().join("policies")).unwrap();
    std::fs::write(corpus.path().join("policies/storage.md"), CORPUS_STORAGE).unwrap();

    let mut config = Config::default();
    config.corpus.dir = corpus.path().to_path_buf();
    config.extract.selector_timeout_secs = 1;
    config.extract.navigation_timeout_secs = 2;
    config.retrieval.variants = 2;
    config.retrieval.top_k = 2;
    tweak(&mut config);

    let provider = MockProvider::with_responses(responses.to_vec()).with_word_embeddings(64);
    let store = SqliteStore::new(":memory:").await.unwrap();
    let app = App::assemble(config, Arc::new(provider.clone()), browser, store);
    Harness {
        app,
        provider,
        _corpus: corpus,
    }
}

fn invoke(tag: &str, args: &str) -> String {
    format!("I will call {tag}.\n```{tag}\n{args}\n```")
}

fn strategy_report() -> String {
    "## Executive Summary\nVideo KYC must finish within 3 days.\n\n\
     ## Key Risks\n- Operations backlog on video KYC.\n\n\
     ## Action Plan by Department\n- Operations: staff the video KYC desk.\n- Engineering: add SLA alerts."
        .to_owned()
}

fn verified_report() -> String {
    format!(
        "{}\n\n## Corrections Made\n- Aligned the deadline with the circular (3 days, not 24 hours).",
        strategy_report()
    )
}

fn write_notice(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("circular.pdf");
    std::fs::write(
        &path,
        minimal_pdf(&[
            "Master Direction on KYC",
            "Regulated entities shall complete video KYC within 3 days.",
        ]),
    )
    .unwrap();
    path
}

#[tokio::test]
async fn pdf_source_produces_verified_report() {
    let docs = tempfile::tempdir().unwrap();
    let pdf = write_notice(docs.path());
    let path_json = serde_json::to_string(&pdf.display().to_string()).unwrap();

    let responses = vec![
        invoke("read_pdf", &format!("{{\"path\": {path_json}}}")),
        "Final Answer:\n- Video KYC must be completed within 3 days.".to_owned(),
        format!(
            "{}\n{}",
            invoke("search_knowledge_base", "{\"query\": \"What is our current KYC process?\"}"),
            invoke("search_knowledge_base", "{\"query\": \"What is our data storage policy?\"}"),
        ),
        "How do we verify customers during onboarding?\nWhat does video KYC involve?".to_owned(),
        "Where is payment data stored?\nHow are backups replicated?".to_owned(),
        "Final Answer: Operations must shorten the video KYC window from 24 hours handling to a \
         3 day regulatory deadline."
            .to_owned(),
        format!("Final Answer:\n{}", strategy_report()),
        format!("Final Answer:\n{}", verified_report()),
    ];
    let h = harness(&responses, MockBrowser::new(), |_| {}).await;
    assert!(matches!(
        h.app.initialize_index().await.unwrap(),
        BuildOutcome::Built { documents: 2, .. }
    ));

    let source = SourceReference::parse(&pdf.display().to_string());
    let (result, trace) = h.app.analyze_with_trace(&source).await;
    let report = result.unwrap();

    for section in [
        "Executive Summary",
        "Key Risks",
        "Action Plan by Department",
        "Corrections Made",
    ] {
        assert!(report.contains(section), "missing {section}");
    }
    assert_eq!(trace.executed(), StageId::ALL.to_vec());
    assert!(
        trace
            .entries()
            .iter()
            .all(|(_, state)| matches!(state, StageState::Succeeded(_)))
    );

    let calls = h.provider.recorded_calls();
    assert_eq!(calls.len(), 8);
    assert_eq!(h.provider.remaining_responses(), 0);

    // The PDF text comes back to Interpret as an observation.
    let interpret_second = &calls[1];
    let observation = &interpret_second.last().unwrap().content;
    assert!(observation.contains("Observation from read_pdf"));
    assert!(observation.contains("within 3 days"));

    // Impact is grounded in retrieved corpus passages.
    let impact_followup = &calls[5];
    let grounding = &impact_followup.last().unwrap().content;
    assert!(grounding.contains("Observation from search_knowledge_base"));
    assert!(grounding.contains("(source:"));

    // Verify sees every upstream output.
    let verify_task = &calls[7][1].content;
    assert!(verify_task.contains("Video KYC must be completed within 3 days."));
    assert!(verify_task.contains("shorten the video KYC window"));
    assert!(verify_task.contains("Action Plan by Department"));

    let outcome = h
        .app
        .record_review(&source, &report, ReviewDecision::Approve)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReviewOutcome::Saved {
            status: AnalysisStatus::Approved,
            ..
        }
    ));
    let saved = h.app.history(None).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].report, report);
    assert_eq!(saved[0].source, pdf.display().to_string());
}

#[tokio::test]
async fn selector_matching_nothing_fails_at_interpret_verbatim() {
    let url = "https://rbi.example/circular";
    let browser = MockBrowser::new().with_page(url, NOTICE_PAGE);
    let responses = vec![
        invoke(
            "scrape_page",
            &format!("{{\"url\": \"{url}\", \"selector\": \"#does-not-exist\"}}"),
        ),
        "Final Answer: should never be reached".to_owned(),
    ];
    let h = harness(&responses, browser.clone(), |_| {}).await;
    h.app.initialize_index().await.unwrap();

    let source = SourceReference::parse(url).with_selector("#does-not-exist");
    let (result, trace) = h.app.analyze_with_trace(&source).await;
    let err = result.unwrap_err();

    let expected = ExtractionError::SelectorNotFound {
        selector: "#does-not-exist".into(),
        url: url.into(),
        timeout: Duration::from_secs(1),
    };
    assert_eq!(err.stage(), StageId::Interpret);
    assert!(matches!(&err, PipelineError::Extraction { error, .. } if *error == expected));
    assert_eq!(err.to_string(), expected.to_string());

    assert_eq!(trace.executed(), vec![StageId::Interpret]);
    assert_eq!(h.provider.recorded_calls().len(), 1);
    assert_eq!(browser.open_sessions(), 0);
}

#[tokio::test]
async fn url_without_selector_is_inspected_then_scraped() {
    let url = "https://rbi.example/circular";
    let browser = MockBrowser::new().with_page(url, NOTICE_PAGE);
    let responses = vec![
        invoke("inspect_page", &format!("{{\"url\": \"{url}\"}}")),
        invoke(
            "scrape_page",
            &format!("{{\"url\": \"{url}\", \"selector\": \"div#content\"}}"),
        ),
        "Final Answer: video KYC deadline is 3 days".to_owned(),
        "Final Answer: operations impact".to_owned(),
        "Final Answer: plan".to_owned(),
        "Final Answer: verified plan".to_owned(),
    ];
    let h = harness(&responses, browser.clone(), |c| {
        c.pipeline.min_distinct_queries = 0;
    })
    .await;
    h.app.initialize_index().await.unwrap();

    let report = h.app.analyze(&SourceReference::parse(url)).await.unwrap();
    assert_eq!(report, "verified plan");

    let calls = h.provider.recorded_calls();
    let outline = &calls[1].last().unwrap().content;
    assert!(outline.contains("Observation from inspect_page"));
    assert!(outline.contains("content"));
    let scraped = &calls[2].last().unwrap().content;
    assert!(scraped.contains("Regulated entities shall complete video KYC within 3 days."));
    assert!(!scraped.contains("Home | Circulars"));
    assert_eq!(browser.launched_sessions(), 2);
    assert_eq!(browser.open_sessions(), 0);
}

#[tokio::test]
async fn turn_budget_exhaustion_stops_the_run() {
    let docs = tempfile::tempdir().unwrap();
    let pdf = write_notice(docs.path());
    let h = harness(&[], MockBrowser::new(), |c| {
        c.pipeline.max_turns = 3;
        c.pipeline.min_distinct_queries = 1;
    })
    .await;
    h.app.initialize_index().await.unwrap();

    let source = SourceReference::parse(&pdf.display().to_string());
    let (result, trace) = h.app.analyze_with_trace(&source).await;
    assert!(matches!(
        result.unwrap_err(),
        PipelineError::StageNonTerminating {
            stage: StageId::Interpret,
            turns: 3
        }
    ));
    assert_eq!(trace.executed(), vec![StageId::Interpret]);
    for later in [StageId::Impact, StageId::Strategy, StageId::Verify] {
        assert_eq!(trace.state(later), Some(&StageState::Pending));
    }
    assert_eq!(h.provider.recorded_calls().len(), 3);
    assert!(h.app.history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn index_is_built_once() {
    let h = harness(&[], MockBrowser::new(), |_| {}).await;
    let first = h.app.initialize_index().await.unwrap();
    let embeds = h.provider.embed_call_count();
    let second = h.app.initialize_index().await.unwrap();

    let BuildOutcome::Built { chunks, .. } = first else {
        panic!("first initialize should build");
    };
    assert_eq!(second, BuildOutcome::AlreadyBuilt { chunks });
    assert_eq!(h.provider.embed_call_count(), embeds);
}

#[tokio::test]
async fn discarded_report_is_not_persisted() {
    let h = harness(&[], MockBrowser::new(), |_| {}).await;
    let source = SourceReference::parse("circular.pdf");
    let outcome = h
        .app
        .record_review(&source, "report", ReviewDecision::Discard)
        .await
        .unwrap();
    assert_eq!(outcome, ReviewOutcome::Discarded);
    h.app
        .record_review(&source, "kept", ReviewDecision::Flag)
        .await
        .unwrap();
    let saved = h.app.history(None).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].status, AnalysisStatus::Flagged);
}
