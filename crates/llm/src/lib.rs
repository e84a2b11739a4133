//! LLM integration crate for motolaw.
//!
//! Provider-agnostic access to chat models behind the [`LlmClient`] trait.
//!
//! # Providers
//! - **OpenAI-compatible**: OpenAI, Azure OpenAI v1, Groq, vLLM and friends
//! - **Ollama**: local LLM runtime
//!
//! # Example
//! ```no_run
//! use motolaw_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("大型重型機車可以上高速公路嗎?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
