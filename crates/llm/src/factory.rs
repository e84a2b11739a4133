//! LLM provider factory.
//!
//! Builds an [`LlmClient`] from provider name, endpoint and secret.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (required by openai)
/// * `timeout` - Optional per-request timeout in seconds
///
/// # Errors
/// Returns error if the provider is unknown, a required secret is missing or
/// the HTTP client cannot be built.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Option<u64>,
) -> Result<Arc<dyn LlmClient>, String> {
    let provider_type =
        ProviderType::parse(provider).ok_or_else(|| format!("Unknown provider: {}", provider))?;
    let base_url = endpoint.unwrap_or(provider_type.default_endpoint());

    match provider_type {
        ProviderType::Ollama => {
            let client = OllamaClient::with_base_url(base_url);
            let client = match timeout {
                Some(secs) => client
                    .with_timeout(Duration::from_secs(secs))
                    .map_err(|e| e.to_string())?,
                None => client,
            };
            Ok(Arc::new(client))
        }
        ProviderType::OpenAI => {
            let api_key = api_key.ok_or_else(|| "OpenAI provider requires API key".to_string())?;
            let client = OpenAiClient::with_base_url(base_url, api_key);
            let client = match timeout {
                Some(secs) => client
                    .with_timeout(Duration::from_secs(secs))
                    .map_err(|e| e.to_string())?,
                None => client,
            };
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint_and_timeout() {
        let client = create_client("ollama", Some("http://localhost:8080"), None, Some(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_openai_requires_api_key() {
        match create_client("openai", None, None, None) {
            Err(err) => assert!(err.contains("OpenAI provider requires API key")),
            Ok(_) => panic!("Expected error for OpenAI without API key"),
        }
    }

    #[test]
    fn test_create_openai_client() {
        let client = create_client("openai", None, Some("sk-test"), Some(30)).unwrap();
        assert_eq!(client.provider_name(), "openai");
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None, None) {
            Err(err) => assert!(err.contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
