//! Judgment service: discrete labels from a language model.
//!
//! A judgment never fails. Model errors and replies outside the allowed set
//! for the kind come back as [`Label::Undecidable`].

use crate::context::{render_evidence, Evidence};
use motolaw_llm::{LlmClient, LlmRequest};
use motolaw_prompt::{build_prompt, PromptCatalog};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The five questions the workflow asks of a judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentKind {
    Safety,
    Route,
    Relevance,
    Groundedness,
    Sufficiency,
}

impl JudgmentKind {
    pub fn prompt_id(&self) -> &'static str {
        match self {
            Self::Safety => "judge.safety",
            Self::Route => "judge.route",
            Self::Relevance => "judge.relevance",
            Self::Groundedness => "judge.grounded",
            Self::Sufficiency => "judge.sufficient",
        }
    }

    /// Reply tokens accepted for this kind and the label each maps to.
    fn vocabulary(&self) -> &'static [(&'static str, Label)] {
        match self {
            // 'yes' means the question touches a blocked category
            Self::Safety => &[("yes", Label::Unsafe), ("no", Label::Safe)],
            Self::Route => &[
                ("vectorstore", Label::KnowledgeBase),
                ("web_search", Label::WebSearch),
            ],
            Self::Relevance | Self::Groundedness | Self::Sufficiency => {
                &[("yes", Label::Yes), ("no", Label::No)]
            }
        }
    }
}

/// Closed set of judgment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Safe,
    Unsafe,
    KnowledgeBase,
    WebSearch,
    Yes,
    No,
    Undecidable,
}

impl Label {
    /// Map a raw model reply to a label of `kind`.
    ///
    /// Exactly one accepted token must appear as a word in the reply.
    pub fn parse(kind: JudgmentKind, reply: &str) -> Label {
        let normalized = reply.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
            .collect();

        let mut found: Option<Label> = None;
        for (token, label) in kind.vocabulary() {
            if words.contains(token) {
                if found.is_some() {
                    return Label::Undecidable;
                }
                found = Some(*label);
            }
        }

        found.unwrap_or(Label::Undecidable)
    }
}

/// A judgment request: the kind plus its inputs.
#[derive(Debug, Clone, Copy)]
pub enum Judgment<'a> {
    Safety { question: &'a str },
    Route { question: &'a str },
    Relevance { question: &'a str, document: &'a str },
    Groundedness { documents: &'a [Evidence], generation: &'a str },
    Sufficiency { question: &'a str, generation: &'a str },
}

impl Judgment<'_> {
    pub fn kind(&self) -> JudgmentKind {
        match self {
            Self::Safety { .. } => JudgmentKind::Safety,
            Self::Route { .. } => JudgmentKind::Route,
            Self::Relevance { .. } => JudgmentKind::Relevance,
            Self::Groundedness { .. } => JudgmentKind::Groundedness,
            Self::Sufficiency { .. } => JudgmentKind::Sufficiency,
        }
    }

    fn variables(&self) -> HashMap<String, String> {
        let pairs: Vec<(&str, String)> = match *self {
            Self::Safety { question } | Self::Route { question } => {
                vec![("question", question.to_string())]
            }
            Self::Relevance { question, document } => vec![
                ("question", question.to_string()),
                ("document", document.to_string()),
            ],
            Self::Groundedness {
                documents,
                generation,
            } => vec![
                ("documents", render_evidence(documents)),
                ("generation", generation.to_string()),
            ],
            Self::Sufficiency {
                question,
                generation,
            } => vec![
                ("question", question.to_string()),
                ("generation", generation.to_string()),
            ],
        };

        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

/// Classifier used at every decision point of the workflow.
#[async_trait::async_trait]
pub trait Judge: Send + Sync {
    async fn classify(&self, judgment: Judgment<'_>) -> Label;
}

/// Judge backed by an [`LlmClient`] at temperature 0.
pub struct LlmJudge {
    client: Arc<dyn LlmClient>,
    model: String,
    prompts: PromptCatalog,
}

impl LlmJudge {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, prompts: PromptCatalog) -> Self {
        Self {
            client,
            model: model.into(),
            prompts,
        }
    }
}

#[async_trait::async_trait]
impl Judge for LlmJudge {
    async fn classify(&self, judgment: Judgment<'_>) -> Label {
        let kind = judgment.kind();

        let built = match self
            .prompts
            .get(kind.prompt_id())
            .and_then(|def| build_prompt(def, judgment.variables()))
        {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(kind = ?kind, error = %e, "Failed to build judgment prompt");
                return Label::Undecidable;
            }
        };

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(16);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        match self.client.complete(&request).await {
            Ok(response) => {
                let label = Label::parse(kind, &response.content);
                if label == Label::Undecidable {
                    tracing::warn!(kind = ?kind, reply = %response.content, "Unrecognized judgment reply");
                }
                label
            }
            Err(e) => {
                tracing::warn!(kind = ?kind, error = %e, "Judgment call failed");
                Label::Undecidable
            }
        }
    }
}
