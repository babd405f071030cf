use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Select};
use finscout_core::bootstrap::{App, AppBuilder, resolve_config_path};
use finscout_core::{ReviewDecision, ReviewOutcome, StageTrace};
use finscout_llm::LlmProvider;
use finscout_memory::{AnalysisRecord, BuildOutcome};
use finscout_tools::{Browser, SourceReference};

/// Analyse regulatory documents against the company knowledge base.
#[derive(Debug, Parser)]
#[command(name = "finscout", version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file (defaults to `FINSCOUT_CONFIG`, then config/default.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the four-stage analysis over a URL or a local PDF and review the report.
    Analyze {
        /// `http(s)://` URL or path to a PDF file.
        source: String,

        /// CSS selector of the content to extract. Discovered automatically when omitted.
        #[arg(long)]
        selector: Option<String>,

        /// Review decision to apply without prompting: approve, flag or discard.
        #[arg(long)]
        decision: Option<ReviewDecision>,

        /// Print the state each stage ended in.
        #[arg(long)]
        trace: bool,
    },

    /// List saved analyses, newest first.
    History {
        /// Show at most this many analyses.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the full report of each analysis.
        #[arg(long)]
        full: bool,
    },

    /// Build the knowledge index from the corpus directory.
    Index {
        /// Drop the existing index and build it again.
        #[arg(long)]
        rebuild: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let builder = AppBuilder::load(config_path.clone())
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), "config loaded");
    let app = builder.build().await?;

    match cli.command {
        Command::Analyze {
            source,
            selector,
            decision,
            trace,
        } => {
            let mut source = SourceReference::parse(&source);
            if let Some(selector) = selector {
                source = source.with_selector(selector);
            }
            prepare_index(&app).await?;
            analyze(&app, &source, decision, trace).await
        }
        Command::History { limit, full } => history(&app, limit, full).await,
        Command::Index { rebuild } => {
            let outcome = if rebuild {
                app.rebuild_index().await
            } else {
                app.initialize_index().await
            }
            .context("failed to build the knowledge index")?;
            println!("{}", describe_build(&outcome));
            Ok(())
        }
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn prepare_index<P: LlmProvider, B: Browser>(app: &App<P, B>) -> anyhow::Result<()> {
    let outcome = app
        .initialize_index()
        .await
        .context("failed to initialize the knowledge index")?;
    tracing::info!("{}", describe_build(&outcome));
    Ok(())
}

async fn analyze<P: LlmProvider, B: Browser>(
    app: &App<P, B>,
    source: &SourceReference,
    decision: Option<ReviewDecision>,
    show_trace: bool,
) -> anyhow::Result<()> {
    let interactive = std::io::stdin().is_terminal();

    let report = loop {
        let (result, trace) = app.analyze_with_trace(source).await;
        if show_trace {
            eprintln!("{}", format_trace(&trace));
        }
        match result {
            Ok(report) => break report,
            Err(e) => {
                eprintln!("Analysis failed: {e}");
                let retry = interactive
                    && Confirm::new()
                        .with_prompt("Retry the analysis?")
                        .default(false)
                        .interact()?;
                if !retry {
                    return Err(e.into());
                }
            }
        }
    };

    println!("{report}");

    let decision = match decision {
        Some(decision) => decision,
        None if interactive => prompt_decision()?,
        None => {
            tracing::warn!("no --decision given and stdin is not a terminal, report not saved");
            ReviewDecision::Discard
        }
    };

    match app
        .record_review(source, &report, decision)
        .await
        .context("failed to save the analysis")?
    {
        ReviewOutcome::Saved { id, status } => eprintln!("Saved analysis #{id} as {status}."),
        ReviewOutcome::Discarded => eprintln!("Report discarded."),
    }
    Ok(())
}

fn prompt_decision() -> anyhow::Result<ReviewDecision> {
    let labels: Vec<&str> = ReviewDecision::ALL.iter().map(|d| d.label()).collect();
    let selection = Select::new()
        .with_prompt("Review the report")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(ReviewDecision::ALL[selection])
}

async fn history<P: LlmProvider, B: Browser>(
    app: &App<P, B>,
    limit: Option<usize>,
    full: bool,
) -> anyhow::Result<()> {
    let records = app
        .history(limit)
        .await
        .context("failed to load saved analyses")?;
    if records.is_empty() {
        println!("No saved analyses.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record, full));
    }
    Ok(())
}

fn describe_build(outcome: &BuildOutcome) -> String {
    match outcome {
        BuildOutcome::AlreadyBuilt { chunks } => {
            format!("Knowledge index already built ({chunks} chunks).")
        }
        BuildOutcome::Built { documents, chunks } => {
            format!("Knowledge index built from {documents} documents ({chunks} chunks).")
        }
    }
}

fn format_record(record: &AnalysisRecord, full: bool) -> String {
    let header = format!(
        "#{} [{}] {} {}",
        record.id, record.status, record.created_at, record.source
    );
    if full {
        format!("{header}\n\n{}\n", record.report)
    } else {
        let first_line = record
            .report
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        format!("{header}\n    {first_line}")
    }
}

fn format_trace(trace: &StageTrace) -> String {
    trace
        .entries()
        .iter()
        .map(|(id, state)| format!("{:>9}: {}", id.as_str(), state.label()))
        .collect::<Vec<_>>()
        .join("\n")
}
