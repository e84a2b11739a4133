//! The request context threaded through a workflow run.
//!
//! Steps take a context by value and hand back a new one; nothing else
//! holds a reference to it while a step runs.

use serde::{Deserialize, Serialize};

/// Where an evidence fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceOrigin {
    KnowledgeBase,
    Web,
}

/// One candidate supporting text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub content: String,
    pub origin: EvidenceOrigin,
}

impl Evidence {
    pub fn knowledge_base(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: EvidenceOrigin::KnowledgeBase,
        }
    }

    pub fn web(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: EvidenceOrigin::Web,
        }
    }
}

/// Render fragments as a numbered block for prompts.
pub fn render_evidence(documents: &[Evidence]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] {}", i + 1, doc.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// State of one in-flight question.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    question: String,
    documents: Vec<Evidence>,
    generation: Option<String>,
}

impl RequestContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            generation: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn documents(&self) -> &[Evidence] {
        &self.documents
    }

    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    /// Replace the document list.
    pub fn with_documents(self, documents: Vec<Evidence>) -> Self {
        Self { documents, ..self }
    }

    /// Append fragments after the ones already gathered.
    pub fn extend_documents(mut self, more: Vec<Evidence>) -> Self {
        self.documents.extend(more);
        self
    }

    pub fn with_generation(self, generation: impl Into<String>) -> Self {
        Self {
            generation: Some(generation.into()),
            ..self
        }
    }

    pub fn without_generation(self) -> Self {
        Self {
            generation: None,
            ..self
        }
    }

    /// Take the final generation out of the context.
    pub fn into_generation(self) -> Option<String> {
        self.generation
    }
}
