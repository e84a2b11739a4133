//! Question answering workflow for motorcycle traffic regulations.
//!
//! The [`Orchestrator`] decides per question whether to consult the local
//! knowledge base or the web, grades the evidence, generates an answer,
//! checks it, and falls back to a direct answer when checks fail.

pub mod budget;
pub mod context;
pub mod judge;
pub mod orchestrator;
pub mod sources;
pub mod synthesizer;

pub use budget::{RetryBudget, RetryLoop, RetryUsage, MAX_EXTRA_ATTEMPTS};
pub use context::{Evidence, EvidenceOrigin, RequestContext};
pub use judge::{Judge, Judgment, JudgmentKind, Label, LlmJudge};
pub use orchestrator::{
    Answer, Orchestrator, OrchestratorBuilder, RunOutcome, Step, DECLINE_MESSAGE,
};
pub use sources::{EvidenceSource, KnowledgeBaseSource, WebSearchSource};
pub use synthesizer::{LlmSynthesizer, Synthesizer};
