//! Evidence sources consulted by the workflow.

use crate::context::Evidence;
use motolaw_core::AppResult;
use motolaw_knowledge::{KnowledgeBase, WebSearchClient};

/// A provider of candidate supporting text.
#[async_trait::async_trait]
pub trait EvidenceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fragments for `question`, best first.
    async fn search(&self, question: &str) -> AppResult<Vec<Evidence>>;
}

/// Local knowledge base lookup. Index failures propagate.
pub struct KnowledgeBaseSource {
    base: KnowledgeBase,
}

impl KnowledgeBaseSource {
    pub fn new(base: KnowledgeBase) -> Self {
        Self { base }
    }
}

#[async_trait::async_trait]
impl EvidenceSource for KnowledgeBaseSource {
    fn name(&self) -> &str {
        "knowledge_base"
    }

    async fn search(&self, question: &str) -> AppResult<Vec<Evidence>> {
        let hits = self.base.retrieve(question).await?;
        Ok(hits
            .into_iter()
            .map(|hit| Evidence::knowledge_base(hit.chunk.text))
            .collect())
    }
}

/// Live web search.
///
/// Provider errors and a missing API key both give an empty result.
pub struct WebSearchSource {
    client: Option<WebSearchClient>,
}

impl WebSearchSource {
    pub fn new(client: WebSearchClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A source that always returns nothing.
    pub fn disabled() -> Self {
        Self { client: None }
    }
}

#[async_trait::async_trait]
impl EvidenceSource for WebSearchSource {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn search(&self, question: &str) -> AppResult<Vec<Evidence>> {
        let Some(client) = &self.client else {
            tracing::warn!("Web search requested but no search API key is configured");
            return Ok(Vec::new());
        };

        match client.search(question).await {
            Ok(results) => Ok(results
                .into_iter()
                .map(|r| Evidence::web(r.content))
                .collect()),
            Err(e) => {
                tracing::warn!(error = %e, "Web search failed, continuing without results");
                Ok(Vec::new())
            }
        }
    }
}
