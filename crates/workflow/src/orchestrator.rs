//! Workflow state machine.
//!
//! One [`Orchestrator::run`] walks the step graph for a single question:
//!
//! ```text
//! Entry -> Retrieve | WebSearch | PlainAnswer | Done
//! Retrieve, WebSearch -> RetrievalGrade
//! RetrievalGrade -> UpdateForWebSearch | RagGenerate | PlainAnswer
//! UpdateForWebSearch -> WebSearch
//! RagGenerate -> UpdateForRegenerate | UpdateForWebSearch | PlainAnswer | Done
//! UpdateForRegenerate -> RagGenerate
//! PlainAnswer -> Done
//! ```
//!
//! Every loop-back edge is gated by the run's [`RetryBudget`], so a run
//! always reaches `Done`.

use crate::budget::{RetryBudget, RetryLoop, RetryUsage};
use crate::context::{Evidence, RequestContext};
use crate::judge::{Judge, Judgment, Label};
use crate::sources::{EvidenceSource, WebSearchSource};
use crate::synthesizer::Synthesizer;
use motolaw_core::{AppError, AppResult};
use motolaw_history::{ConversationRecord, HistoryStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Text returned to callers when a question is declined.
pub const DECLINE_MESSAGE: &str = "不回答該問題";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Processing steps of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Entry,
    Retrieve,
    WebSearch,
    RetrievalGrade,
    UpdateForWebSearch,
    RagGenerate,
    UpdateForRegenerate,
    PlainAnswer,
    Done,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Retrieve => "retrieve",
            Self::WebSearch => "web_search",
            Self::RetrievalGrade => "retrieval_grade",
            Self::UpdateForWebSearch => "update_for_web_search",
            Self::RagGenerate => "rag_generate",
            Self::UpdateForRegenerate => "update_for_regenerate",
            Self::PlainAnswer => "plain_answer",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum Answer {
    Generated(String),
    /// The safety screen rejected the question.
    Declined,
}

impl Answer {
    /// Text shown to a user.
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Declined => DECLINE_MESSAGE,
        }
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined)
    }
}

/// Answer plus the path taken to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: String,
    pub answer: Answer,
    pub trace: Vec<Step>,
    pub retries: RetryUsage,
}

/// Runs questions through the step graph.
///
/// Holds only shared collaborators; all per-question state lives in the
/// run itself, so one orchestrator serves concurrent questions.
pub struct Orchestrator {
    judge: Arc<dyn Judge>,
    knowledge: Arc<dyn EvidenceSource>,
    web: Arc<dyn EvidenceSource>,
    synthesizer: Arc<dyn Synthesizer>,
    history: Option<Arc<dyn HistoryStore>>,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Answer `question` without recording it.
    pub async fn run(&self, question: &str) -> AppResult<RunOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("workflow", run_id = %run_id);
        self.execute(question, run_id).instrument(span).await
    }

    /// Answer `question` and record the exchange in the history store.
    ///
    /// A history failure is logged; the answer is still returned.
    pub async fn answer(&self, question: &str) -> AppResult<RunOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("workflow", run_id = %run_id);

        async move {
            let outcome = self.execute(question, run_id).await?;
            self.persist(question, &outcome.answer).await;
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn persist(&self, question: &str, answer: &Answer) {
        let Some(history) = &self.history else {
            return;
        };

        let record = ConversationRecord::new(question, answer.text());
        let conversation_id = record.conversation_id.clone();
        match tokio::time::timeout(self.call_timeout, history.record(record)).await {
            Ok(Ok(())) => tracing::debug!(conversation_id = %conversation_id, "Conversation recorded"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to record conversation"),
            Err(_) => tracing::warn!(
                timeout_secs = self.call_timeout.as_secs(),
                "Recording conversation timed out"
            ),
        }
    }

    async fn execute(&self, question: &str, run_id: String) -> AppResult<RunOutcome> {
        tracing::info!(question, "Workflow started");

        let mut ctx = RequestContext::new(question);
        let mut budget = RetryBudget::new();
        let mut trace = Vec::new();
        let mut declined = false;
        let mut regenerating = false;
        let mut step = Step::Entry;

        loop {
            trace.push(step);
            tracing::info!(
                step = step.as_str(),
                documents = ctx.documents().len(),
                "Workflow step"
            );

            step = match step {
                Step::Entry => {
                    let next = self.entry(&ctx).await;
                    declined = next == Step::Done;
                    next
                }
                Step::Retrieve => {
                    let documents = self.search_knowledge(ctx.question()).await?;
                    ctx = ctx.with_documents(documents);
                    Step::RetrievalGrade
                }
                Step::WebSearch => {
                    let documents = self.search_web(ctx.question()).await;
                    ctx = ctx.extend_documents(documents);
                    Step::RetrievalGrade
                }
                Step::RetrievalGrade => {
                    ctx = self.grade_documents(ctx).await;
                    if !ctx.documents().is_empty() {
                        Step::RagGenerate
                    } else if budget.try_consume(RetryLoop::WebSearch) {
                        Step::UpdateForWebSearch
                    } else {
                        Step::PlainAnswer
                    }
                }
                Step::UpdateForWebSearch => {
                    tracing::debug!(
                        attempt = budget.used(RetryLoop::WebSearch),
                        "Retrying with web search"
                    );
                    Step::WebSearch
                }
                Step::RagGenerate => {
                    let generation = if std::mem::take(&mut regenerating) {
                        self.resynthesize(ctx.question(), ctx.documents()).await?
                    } else {
                        self.synthesize(ctx.question(), Some(ctx.documents()))
                            .await?
                    };
                    ctx = ctx.with_generation(generation);
                    self.check_generation(&ctx, &mut budget).await
                }
                Step::UpdateForRegenerate => {
                    tracing::debug!(
                        attempt = budget.used(RetryLoop::Regenerate),
                        "Regenerating against the same evidence"
                    );
                    ctx = ctx.without_generation();
                    regenerating = true;
                    Step::RagGenerate
                }
                Step::PlainAnswer => {
                    let generation = self.synthesize(ctx.question(), None).await?;
                    ctx = ctx.with_generation(generation);
                    Step::Done
                }
                Step::Done => break,
            };
        }

        let answer = if declined {
            Answer::Declined
        } else {
            let text = ctx.into_generation().ok_or_else(|| {
                AppError::Workflow("Run finished without a generation".to_string())
            })?;
            Answer::Generated(text)
        };

        let retries = budget.usage();
        tracing::info!(
            declined = answer.is_declined(),
            steps = trace.len(),
            web_search_retries = retries.web_search,
            regenerate_retries = retries.regenerate,
            "Workflow finished"
        );

        Ok(RunOutcome {
            run_id,
            answer,
            trace,
            retries,
        })
    }

    /// Safety screen, then source routing. Decided once.
    async fn entry(&self, ctx: &RequestContext) -> Step {
        let question = ctx.question();

        match self.classify(Judgment::Safety { question }).await {
            Label::Unsafe => {
                tracing::info!("Question declined by safety screen");
                return Step::Done;
            }
            Label::Safe => {}
            _ => return Step::PlainAnswer,
        }

        match self.classify(Judgment::Route { question }).await {
            Label::KnowledgeBase => Step::Retrieve,
            Label::WebSearch => Step::WebSearch,
            _ => Step::PlainAnswer,
        }
    }

    /// Keep only fragments judged relevant, in their original order.
    async fn grade_documents(&self, ctx: RequestContext) -> RequestContext {
        let mut kept: Vec<Evidence> = Vec::with_capacity(ctx.documents().len());

        for document in ctx.documents() {
            let label = self
                .classify(Judgment::Relevance {
                    question: ctx.question(),
                    document: &document.content,
                })
                .await;

            if label == Label::Yes {
                kept.push(document.clone());
            }
        }

        tracing::debug!(
            gathered = ctx.documents().len(),
            relevant = kept.len(),
            "Graded evidence"
        );
        ctx.with_documents(kept)
    }

    /// Groundedness first, then sufficiency.
    async fn check_generation(&self, ctx: &RequestContext, budget: &mut RetryBudget) -> Step {
        let generation = ctx.generation().unwrap_or_default();

        let grounded = self
            .classify(Judgment::Groundedness {
                documents: ctx.documents(),
                generation,
            })
            .await;
        match grounded {
            Label::Yes => {}
            Label::No if budget.try_consume(RetryLoop::Regenerate) => {
                return Step::UpdateForRegenerate
            }
            // Exhausted regenerate budget skips web search.
            _ => return Step::PlainAnswer,
        }

        let sufficient = self
            .classify(Judgment::Sufficiency {
                question: ctx.question(),
                generation,
            })
            .await;
        match sufficient {
            Label::Yes => Step::Done,
            Label::No if budget.try_consume(RetryLoop::WebSearch) => Step::UpdateForWebSearch,
            _ => Step::PlainAnswer,
        }
    }

    async fn classify(&self, judgment: Judgment<'_>) -> Label {
        let kind = judgment.kind();
        match self.with_timeout(self.judge.classify(judgment)).await {
            Some(label) => {
                tracing::debug!(kind = ?kind, label = ?label, "Judgment");
                label
            }
            None => {
                tracing::warn!(kind = ?kind, "Judgment timed out");
                Label::Undecidable
            }
        }
    }

    async fn search_knowledge(&self, question: &str) -> AppResult<Vec<Evidence>> {
        self.with_timeout(self.knowledge.search(question))
            .await
            .ok_or_else(|| self.timeout_error("knowledge base retrieval"))?
    }

    async fn search_web(&self, question: &str) -> Vec<Evidence> {
        match self.with_timeout(self.web.search(question)).await {
            Some(Ok(documents)) => documents,
            Some(Err(e)) => {
                tracing::warn!(source = self.web.name(), error = %e, "Web search failed");
                Vec::new()
            }
            None => {
                tracing::warn!(source = self.web.name(), "Web search timed out");
                Vec::new()
            }
        }
    }

    async fn synthesize(&self, question: &str, evidence: Option<&[Evidence]>) -> AppResult<String> {
        self.with_timeout(self.synthesizer.generate(question, evidence))
            .await
            .ok_or_else(|| self.timeout_error("answer generation"))?
    }

    async fn resynthesize(&self, question: &str, evidence: &[Evidence]) -> AppResult<String> {
        self.with_timeout(self.synthesizer.regenerate(question, evidence))
            .await
            .ok_or_else(|| self.timeout_error("answer generation"))?
    }

    async fn with_timeout<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::time::timeout(self.call_timeout, fut).await.ok()
    }

    fn timeout_error(&self, operation: &str) -> AppError {
        AppError::Timeout {
            operation: operation.to_string(),
            seconds: self.call_timeout.as_secs(),
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    judge: Option<Arc<dyn Judge>>,
    knowledge: Option<Arc<dyn EvidenceSource>>,
    web: Option<Arc<dyn EvidenceSource>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    history: Option<Arc<dyn HistoryStore>>,
    call_timeout: Duration,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            judge: None,
            knowledge: None,
            web: None,
            synthesizer: None,
            history: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn knowledge(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.knowledge = Some(source);
        self
    }

    /// Without one, web search yields no evidence.
    pub fn web(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.web = Some(source);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn build(self) -> AppResult<Orchestrator> {
        let missing = |what: &str| AppError::Workflow(format!("Orchestrator requires {}", what));

        if self.call_timeout.is_zero() {
            return Err(AppError::Workflow(
                "Call timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Orchestrator {
            judge: self.judge.ok_or_else(|| missing("a judge"))?,
            knowledge: self.knowledge.ok_or_else(|| missing("a knowledge source"))?,
            web: self
                .web
                .unwrap_or_else(|| Arc::new(WebSearchSource::disabled())),
            synthesizer: self.synthesizer.ok_or_else(|| missing("a synthesizer"))?,
            history: self.history,
            call_timeout: self.call_timeout,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
