//! Tavily web search client.
//!
//! API: `POST {endpoint}` with `{api_key, query, max_results}`; each result
//! carries `title`, `url` and a `content` snippet.

use motolaw_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

/// A single search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Web search client.
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    endpoint: String,
    api_key: String,
    max_results: u32,
    client: reqwest::Client,
}

impl WebSearchClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        max_results: u32,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Search(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            max_results,
            client,
        })
    }

    fn to_request<'a>(&'a self, query: &'a str) -> SearchRequest<'a> {
        SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            search_depth: "basic",
        }
    }

    /// Run a search and return results with non-empty content, in rank order.
    pub async fn search(&self, query: &str) -> AppResult<Vec<WebResult>> {
        tracing::debug!(query, "Sending web search request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.to_request(query))
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Failed to send search request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Search(format!(
                "Search API error ({}): {}",
                status, error_text
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(format!("Failed to parse search response: {}", e)))?;

        Ok(parse_results(body))
    }
}

fn parse_results(body: SearchResponse) -> Vec<WebResult> {
    body.results
        .into_iter()
        .filter(|r| !r.content.trim().is_empty())
        .collect()
}
