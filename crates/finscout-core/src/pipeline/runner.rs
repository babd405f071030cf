use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use finscout_llm::provider::chat_with_timeout;
use finscout_llm::{LlmProvider, Message};

use super::capability::{
    self, CapabilityCall, CapabilityExecutor, CapabilityFailure, CapabilityKind, Invocation,
    Observation,
};
use super::stage::{ExtractionPolicy, Stage, StageContext};
use super::{PipelineError, StageError};

/// Marker that starts a stage's final output.
pub const FINAL_ANSWER: &str = "Final Answer:";

const FORMAT_REMINDER: &str = "Your reply contained neither a capability invocation nor a final answer. \
Invoke a capability with a fenced block, or reply with a line starting with \"Final Answer:\" \
followed by your complete output.";

const EMPTY_ANSWER_REMINDER: &str =
    "Your final answer was empty. Reply with \"Final Answer:\" followed by your complete output.";

/// Runs one stage as a bounded reason-act loop.
pub struct StageRunner<E, P> {
    executor: Arc<E>,
    provider: Arc<P>,
    max_turns: usize,
    llm_timeout: Duration,
}

impl<E, P> StageRunner<E, P>
where
    E: CapabilityExecutor,
    P: LlmProvider,
{
    #[must_use]
    pub fn new(
        executor: Arc<E>,
        provider: Arc<P>,
        max_turns: usize,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            provider,
            max_turns,
            llm_timeout,
        }
    }

    #[must_use]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Run `stage` against the outputs gathered so far and return its final answer.
    ///
    /// Each turn is one model call. Capability invocations in a reply are run
    /// and their observations sent back; a reply with a final answer and no
    /// invocations ends the stage.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::StageFailed`] when an input is missing or a model call fails or times out
    /// - [`PipelineError::Extraction`] when extraction fails and the stage aborts on that
    /// - [`PipelineError::StageNonTerminating`] when the turn budget runs out
    pub async fn execute(
        &self,
        stage: &Stage,
        context: &StageContext,
    ) -> Result<String, PipelineError> {
        let failed = |error: StageError| PipelineError::StageFailed {
            stage: stage.id,
            error,
        };

        let inputs = context.render_inputs(&stage.reads).map_err(failed)?;
        let mut messages = vec![
            Message::system(system_prompt(stage)),
            Message::user(task_prompt(stage, &inputs)),
        ];
        let mut queries: HashSet<String> = HashSet::new();
        let mut grounded = stage.required_capabilities.is_empty();

        for turn in 1..=self.max_turns {
            let response = chat_with_timeout(self.provider.as_ref(), &messages, self.llm_timeout)
                .await
                .map_err(|e| failed(StageError::Llm(e)))?;
            tracing::debug!(stage = %stage.id, turn, chars = response.len(), "model replied");

            let invocations = capability::parse_invocations(&response);
            let answer = final_answer(&response).map(str::to_owned);
            messages.push(Message::assistant(response));

            if !invocations.is_empty() {
                let mut observations = Vec::with_capacity(invocations.len());
                for invocation in invocations {
                    let observation = self.invoke(stage, invocation, &mut queries).await;
                    if let Err(CapabilityFailure::Extraction(error)) = &observation.outcome
                        && stage.on_extraction_failure == ExtractionPolicy::Abort
                    {
                        tracing::warn!(
                            stage = %stage.id,
                            "aborting on extraction failure: {error}"
                        );
                        return Err(PipelineError::Extraction {
                            stage: stage.id,
                            error: error.clone(),
                        });
                    }
                    if observation.outcome.is_ok()
                        && stage.required_capabilities.contains(&observation.kind)
                    {
                        grounded = true;
                    }
                    observations.push(observation.to_string());
                }
                messages.push(Message::user(observations.join("\n\n")));
                continue;
            }

            match answer {
                Some(_) if !grounded => {
                    tracing::debug!(
                        stage = %stage.id,
                        turn,
                        "final answer refused before extraction"
                    );
                    messages.push(Message::user(capability_reminder(&stage.required_capabilities)));
                }
                Some(_) if queries.len() < stage.min_distinct_queries => {
                    tracing::debug!(
                        stage = %stage.id,
                        turn,
                        issued = queries.len(),
                        required = stage.min_distinct_queries,
                        "final answer refused"
                    );
                    messages.push(Message::user(query_reminder(
                        queries.len(),
                        stage.min_distinct_queries,
                    )));
                }
                Some(answer) if answer.is_empty() => {
                    messages.push(Message::user(EMPTY_ANSWER_REMINDER));
                }
                Some(answer) => {
                    tracing::info!(
                        stage = %stage.id,
                        turns = turn,
                        chars = answer.len(),
                        "stage finished"
                    );
                    return Ok(answer);
                }
                None => messages.push(Message::user(FORMAT_REMINDER)),
            }
        }

        tracing::warn!(stage = %stage.id, turns = self.max_turns, "turn budget exhausted");
        Err(PipelineError::StageNonTerminating {
            stage: stage.id,
            turns: self.max_turns,
        })
    }

    async fn invoke(
        &self,
        stage: &Stage,
        invocation: Invocation,
        queries: &mut HashSet<String>,
    ) -> Observation {
        let kind = invocation.kind;
        if !stage.allows(kind) {
            tracing::warn!(stage = %stage.id, capability = %kind, "capability not granted");
            return Observation {
                kind,
                outcome: Err(CapabilityFailure::NotPermitted),
            };
        }
        let call = match invocation.call {
            Ok(call) => call,
            Err(reason) => {
                return Observation {
                    kind,
                    outcome: Err(CapabilityFailure::InvalidArguments(reason)),
                };
            }
        };
        if let CapabilityCall::SearchKnowledgeBase(args) = &call {
            queries.insert(normalize_query(&args.query));
        }

        tracing::info!(stage = %stage.id, capability = %kind, "invoking capability");
        let outcome = self.executor.execute(&call).await;
        match &outcome {
            Ok(text) => {
                tracing::debug!(capability = %kind, chars = text.len(), "capability succeeded");
            }
            Err(CapabilityFailure::RetrievalEmpty) => {
                tracing::info!(capability = %kind, "no supporting evidence found");
            }
            Err(e) => tracing::warn!(capability = %kind, "capability failed: {e}"),
        }
        Observation { kind, outcome }
    }
}

/// Text after the first line starting with [`FINAL_ANSWER`], trimmed.
#[must_use]
pub fn final_answer(response: &str) -> Option<&str> {
    let mut offset = 0;
    for line in response.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(FINAL_ANSWER) {
            let start = offset + (line.len() - trimmed.len()) + FINAL_ANSWER.len();
            return Some(response[start..].trim());
        }
        offset += line.len();
    }
    None
}

fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn query_reminder(issued: usize, required: usize) -> String {
    format!(
        "You have issued {issued} distinct knowledge base queries; at least {required} are required \
         before a final answer. Ask further specific questions with search_knowledge_base."
    )
}

fn capability_reminder(any_of: &[CapabilityKind]) -> String {
    let names: Vec<&str> = any_of.iter().map(|kind| kind.tag()).collect();
    format!(
        "No content has been extracted yet. Call {} successfully and work from its observation \
         before giving a final answer.",
        names.join(" or ")
    )
}

fn system_prompt(stage: &Stage) -> String {
    let mut prompt = format!("You are the {}. {}\n\n", stage.role, stage.goal);
    if stage.capabilities.is_empty() {
        prompt.push_str("You have no capabilities. Work only from the material you are given.\n\n");
    } else {
        prompt.push_str(&capability::format_for_prompt(&stage.capabilities));
        prompt.push_str(
            "\n\nTo use a capability, reply with its fenced block and wait for the observation. \
             You may invoke several capabilities in one reply.\n\n",
        );
    }
    prompt.push_str(&format!(
        "When you are done, reply with a line starting with \"{FINAL_ANSWER}\" followed by your \
         complete output. Do not invoke capabilities in the same reply as your final answer."
    ));
    prompt
}

fn task_prompt(stage: &Stage, inputs: &str) -> String {
    let mut prompt = stage.instructions.clone();
    if !stage.produces.is_empty() {
        prompt.push_str("\n\nExpected output: ");
        prompt.push_str(&stage.produces);
    }
    if !inputs.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(inputs);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use finscout_llm::Role;
    use finscout_llm::mock::MockProvider;
    use finscout_tools::{ExtractionError, SourceReference};

    use super::*;
    use crate::pipeline::stage::{StageId, StageInput};

    #[derive(Default)]
    struct ScriptedExecutor {
        calls: Mutex<Vec<CapabilityCall>>,
        fail_extraction: bool,
        empty_search: bool,
    }

    impl ScriptedExecutor {
        fn calls(&self) -> Vec<CapabilityCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CapabilityExecutor for ScriptedExecutor {
        async fn execute(&self, call: &CapabilityCall) -> Result<String, CapabilityFailure> {
            self.calls.lock().unwrap().push(call.clone());
            match call {
                CapabilityCall::ScrapePage(args) if self.fail_extraction => {
                    Err(CapabilityFailure::Extraction(ExtractionError::SelectorNotFound {
                        selector: args.selector.clone(),
                        url: args.url.clone(),
                        timeout: Duration::from_secs(10),
                    }))
                }
                CapabilityCall::SearchKnowledgeBase(_) if self.empty_search => {
                    Err(CapabilityFailure::RetrievalEmpty)
                }
                CapabilityCall::SearchKnowledgeBase(args) => {
                    Ok(format!("[1] answer to {}", args.query))
                }
                _ => Ok("page text".into()),
            }
        }
    }

    fn runner(
        responses: &[&str],
        executor: ScriptedExecutor,
        max_turns: usize,
    ) -> (StageRunner<ScriptedExecutor, MockProvider>, MockProvider, Arc<ScriptedExecutor>) {
        let provider =
            MockProvider::with_responses(responses.iter().map(|s| (*s).to_owned()).collect());
        let executor = Arc::new(executor);
        let runner = StageRunner::new(
            Arc::clone(&executor),
            Arc::new(provider.clone()),
            max_turns,
            Duration::from_secs(5),
        );
        (runner, provider, executor)
    }

    fn context() -> StageContext {
        StageContext::new(
            SourceReference::parse("https://rbi.example/notice").with_selector("#body"),
        )
    }

    fn interpret(policy: ExtractionPolicy) -> Stage {
        Stage::new(StageId::Interpret, "Regulatory Interpreter", "Summarise the notice.")
            .with_capabilities(&[CapabilityKind::ScrapePage])
            .reading(&[StageInput::Source])
            .with_instructions("Read the source.")
            .on_extraction_failure(policy)
    }

    fn impact(min_queries: usize) -> Stage {
        Stage::new(StageId::Impact, "Business Impact Analyst", "Assess impact.")
            .with_capabilities(&[CapabilityKind::SearchKnowledgeBase])
            .requiring_queries(min_queries)
    }

    const SCRAPE: &str =
        "```scrape_page\n{\"url\": \"https://rbi.example/notice\", \"selector\": \"#body\"}\n```";

    fn search(query: &str) -> String {
        format!("```search_knowledge_base\n{{\"query\": \"{query}\"}}\n```")
    }

    #[test]
    fn final_answer_takes_everything_after_marker() {
        let text = "Thought: done.\nFinal Answer: - change one\n- change two\n";
        assert_eq!(final_answer(text), Some("- change one\n- change two"));
        assert_eq!(final_answer("  Final Answer:   x  "), Some("x"));
        assert_eq!(final_answer("no marker here"), None);
        assert_eq!(final_answer("The Final Answer: inline"), None);
    }

    #[test]
    fn queries_normalize_case_and_spacing() {
        assert_eq!(normalize_query("  What is   our KYC?"), "what is our kyc?");
    }

    #[tokio::test]
    async fn final_answer_on_first_turn() {
        let (runner, provider, _) =
            runner(&["Final Answer: summary"], ScriptedExecutor::default(), 3);
        let out = runner
            .execute(&interpret(ExtractionPolicy::Continue), &context())
            .await
            .unwrap();
        assert_eq!(out, "summary");

        let calls = provider.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert!(calls[0][0].content.contains("Regulatory Interpreter"));
        assert!(calls[0][0].content.contains("scrape_page"));
        assert!(calls[0][1].content.contains("#body"));
    }

    #[tokio::test]
    async fn observation_is_fed_back() {
        let (runner, provider, executor) =
            runner(&[SCRAPE, "Final Answer: done"], ScriptedExecutor::default(), 3);
        runner
            .execute(&interpret(ExtractionPolicy::Continue), &context())
            .await
            .unwrap();
        assert_eq!(executor.calls().len(), 1);
        let second = &provider.recorded_calls()[1];
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with("Observation from scrape_page"));
        assert!(last.content.contains("page text"));
    }

    #[tokio::test]
    async fn capabilities_run_before_final_answer_in_same_reply() {
        let reply = format!("{SCRAPE}\nFinal Answer: premature");
        let (runner, _, executor) =
            runner(&[&reply, "Final Answer: grounded"], ScriptedExecutor::default(), 3);
        let out = runner
            .execute(&interpret(ExtractionPolicy::Continue), &context())
            .await
            .unwrap();
        assert_eq!(out, "grounded");
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_is_observation_when_continuing() {
        let executor = ScriptedExecutor {
            fail_extraction: true,
            ..ScriptedExecutor::default()
        };
        let (runner, provider, _) = runner(&[SCRAPE, "Final Answer: could not read"], executor, 3);
        let out = runner
            .execute(&interpret(ExtractionPolicy::Continue), &context())
            .await
            .unwrap();
        assert_eq!(out, "could not read");
        let feedback = provider.recorded_calls()[1].last().unwrap().content.clone();
        assert!(feedback.contains("selector '#body' not found on https://rbi.example/notice"));
    }

    #[tokio::test]
    async fn extraction_failure_aborts_when_policy_says_so() {
        let executor = ScriptedExecutor {
            fail_extraction: true,
            ..ScriptedExecutor::default()
        };
        let (runner, provider, _) = runner(&[SCRAPE, "Final Answer: unused"], executor, 3);
        let err = runner
            .execute(&interpret(ExtractionPolicy::Abort), &context())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "selector '#body' not found on https://rbi.example/notice within 10s"
        );
        assert!(matches!(err, PipelineError::Extraction { .. }));
        assert_eq!(provider.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn final_answer_refused_until_content_extracted() {
        let stage = interpret(ExtractionPolicy::Continue)
            .requiring_capability(&[CapabilityKind::ReadPdf, CapabilityKind::ScrapePage]);
        let (runner, provider, executor) = runner(
            &["Final Answer: from memory", SCRAPE, "Final Answer: grounded"],
            ScriptedExecutor::default(),
            4,
        );
        let out = runner.execute(&stage, &context()).await.unwrap();
        assert_eq!(out, "grounded");
        assert_eq!(executor.calls().len(), 1);

        let refused = provider.recorded_calls()[1].last().unwrap().content.clone();
        assert!(refused.contains("No content has been extracted yet"));
        assert!(refused.contains("read_pdf or scrape_page"));
    }

    #[tokio::test]
    async fn failed_extraction_does_not_unlock_final_answer() {
        let executor = ScriptedExecutor {
            fail_extraction: true,
            ..ScriptedExecutor::default()
        };
        let stage = interpret(ExtractionPolicy::Continue)
            .requiring_capability(&[CapabilityKind::ScrapePage]);
        let (runner, provider, _) = runner(&[SCRAPE, "Final Answer: could not read"], executor, 2);
        let err = runner.execute(&stage, &context()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageNonTerminating {
                stage: StageId::Interpret,
                turns: 2
            }
        ));
        assert_eq!(provider.recorded_calls().len(), 2);
    }

    #[tokio::test]
    async fn ungranted_capability_is_reported_not_run() {
        let reply = search("kyc");
        let (runner, provider, executor) =
            runner(&[&reply, "Final Answer: ok"], ScriptedExecutor::default(), 3);
        runner
            .execute(&interpret(ExtractionPolicy::Abort), &context())
            .await
            .unwrap();
        assert!(executor.calls().is_empty());
        let feedback = provider.recorded_calls()[1].last().unwrap().content.clone();
        assert!(feedback.contains("not available in this stage"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported() {
        let (runner, provider, executor) = runner(
            &["```scrape_page\n{\"url\": 5}\n```", "Final Answer: ok"],
            ScriptedExecutor::default(),
            3,
        );
        runner
            .execute(&interpret(ExtractionPolicy::Abort), &context())
            .await
            .unwrap();
        assert!(executor.calls().is_empty());
        let feedback = provider.recorded_calls()[1].last().unwrap().content.clone();
        assert!(feedback.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn format_reminder_consumes_a_turn() {
        let (runner, provider, _) =
            runner(&["I think...", "Final Answer: fine"], ScriptedExecutor::default(), 3);
        let out = runner
            .execute(&interpret(ExtractionPolicy::Continue), &context())
            .await
            .unwrap();
        assert_eq!(out, "fine");
        let feedback = provider.recorded_calls()[1].last().unwrap().content.clone();
        assert_eq!(feedback, FORMAT_REMINDER);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_non_terminating() {
        let (runner, provider, _) = runner(&[], ScriptedExecutor::default(), 3);
        let err = runner
            .execute(&interpret(ExtractionPolicy::Continue), &context())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageNonTerminating {
                stage: StageId::Interpret,
                turns: 3
            }
        ));
        assert_eq!(provider.recorded_calls().len(), 3);
    }

    #[tokio::test]
    async fn final_answer_refused_until_distinct_queries_issued() {
        let first = search("What is our KYC process?");
        let repeat = search("what is our  KYC process?");
        let second = search("Where is payment data stored?");
        let (runner, provider, executor) = runner(
            &[&first, "Final Answer: early", &repeat, &second, "Final Answer: complete"],
            ScriptedExecutor::default(),
            6,
        );
        let out = runner.execute(&impact(2), &context()).await.unwrap();
        assert_eq!(out, "complete");
        assert_eq!(executor.calls().len(), 3);

        let refused = provider.recorded_calls()[2].last().unwrap().content.clone();
        assert!(refused.contains("1 distinct knowledge base queries"));
    }

    #[tokio::test]
    async fn empty_retrieval_is_not_fatal() {
        let executor = ScriptedExecutor {
            empty_search: true,
            ..ScriptedExecutor::default()
        };
        let q = search("data localisation");
        let (runner, provider, _) = runner(&[&q, "Final Answer: no evidence"], executor, 3);
        let out = runner.execute(&impact(1), &context()).await.unwrap();
        assert_eq!(out, "no evidence");
        let feedback = provider.recorded_calls()[1].last().unwrap().content.clone();
        assert!(feedback.contains("no supporting evidence"));
    }

    #[tokio::test]
    async fn missing_input_fails_stage() {
        let stage = Stage::new(StageId::Verify, "Verifier", "Check.")
            .reading(&[StageInput::Stage(StageId::Strategy)]);
        let (runner, provider, _) = runner(&["Final Answer: x"], ScriptedExecutor::default(), 3);
        let err = runner.execute(&stage, &context()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                stage: StageId::Verify,
                error: StageError::MissingInput(StageId::Strategy)
            }
        ));
        assert!(provider.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn llm_failure_fails_stage() {
        let provider = MockProvider::failing();
        let runner = StageRunner::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(provider),
            3,
            Duration::from_secs(5),
        );
        let err = runner.execute(&impact(0), &context()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                error: StageError::Llm(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let provider =
            MockProvider::with_responses(vec!["Final Answer: late".into()]).with_delay(5_000);
        let runner = StageRunner::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(provider),
            3,
            Duration::from_secs(1),
        );
        let err = runner.execute(&impact(0), &context()).await.unwrap_err();
        assert_eq!(err.to_string(), "stage 'impact' failed: chat timed out after 1s");
    }
}
