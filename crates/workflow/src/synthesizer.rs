//! Answer synthesis.

use crate::context::{render_evidence, Evidence};
use motolaw_core::AppResult;
use motolaw_llm::{LlmClient, LlmRequest};
use motolaw_prompt::{build_prompt, PromptCatalog};
use std::collections::HashMap;
use std::sync::Arc;

const RAG_PROMPT_ID: &str = "answer.rag";
const PLAIN_PROMPT_ID: &str = "answer.plain";

pub const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REGENERATION_TEMPERATURE: f32 = 1.0;

/// Produces the natural-language answer.
#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    /// With `evidence`, answer only from it. Without, answer from the model.
    async fn generate(&self, question: &str, evidence: Option<&[Evidence]>) -> AppResult<String>;

    /// Second attempt after the previous answer was judged ungrounded.
    async fn regenerate(&self, question: &str, evidence: &[Evidence]) -> AppResult<String> {
        self.generate(question, Some(evidence)).await
    }
}

pub struct LlmSynthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
    prompts: PromptCatalog,
    temperature: f32,
    regeneration_temperature: f32,
}

impl LlmSynthesizer {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, prompts: PromptCatalog) -> Self {
        Self {
            client,
            model: model.into(),
            prompts,
            temperature: DEFAULT_GENERATION_TEMPERATURE,
            regeneration_temperature: DEFAULT_REGENERATION_TEMPERATURE,
        }
    }

    /// Sampling temperatures for the first answer and for the retry.
    pub fn with_temperatures(mut self, generation: f32, regeneration: f32) -> Self {
        self.temperature = generation;
        self.regeneration_temperature = regeneration;
        self
    }

    async fn complete(
        &self,
        question: &str,
        evidence: Option<&[Evidence]>,
        temperature: f32,
    ) -> AppResult<String> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());

        let prompt_id = match evidence {
            Some(documents) => {
                variables.insert("documents".to_string(), render_evidence(documents));
                RAG_PROMPT_ID
            }
            None => PLAIN_PROMPT_ID,
        };

        let built = build_prompt(self.prompts.get(prompt_id)?, variables)?;
        let mut request =
            LlmRequest::new(built.user, &self.model).with_temperature(temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self.client.complete(&request).await?;
        if !response.done {
            tracing::warn!(prompt = prompt_id, "Generation stopped before completion");
        }

        Ok(response.content.trim().to_string())
    }
}

#[async_trait::async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn generate(&self, question: &str, evidence: Option<&[Evidence]>) -> AppResult<String> {
        self.complete(question, evidence, self.temperature).await
    }

    async fn regenerate(&self, question: &str, evidence: &[Evidence]) -> AppResult<String> {
        tracing::debug!(
            temperature = self.regeneration_temperature,
            "Regenerating answer"
        );
        self.complete(question, Some(evidence), self.regeneration_temperature)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motolaw_core::AppError;
    use motolaw_llm::{LlmResponse, LlmUsage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoClient {
        prompts: Mutex<Vec<String>>,
        temperatures: Mutex<Vec<Option<f32>>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for EchoClient {
        fn provider_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            let system = request.system.clone().unwrap_or_default();
            self.prompts
                .lock()
                .unwrap()
                .push(format!("{}\n{}", system, request.prompt));
            self.temperatures.lock().unwrap().push(request.temperature);
            Ok(LlmResponse {
                content: "  年滿20歲  \n".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            })
        }
    }

    struct DownClient;

    #[async_trait::async_trait]
    impl LlmClient for DownClient {
        fn provider_name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
            Err(AppError::Llm("HTTP 503".to_string()))
        }
    }

    #[tokio::test]
    async fn test_rag_mode_includes_evidence() {
        let client = Arc::new(EchoClient::default());
        let synth = LlmSynthesizer::new(client.clone(), "m", PromptCatalog::builtin().unwrap());
        let docs = vec![Evidence::knowledge_base("大型重型機車駕照須年滿二十歲")];

        let answer = synth
            .generate("大型重型機車的駕照年齡限制", Some(&docs))
            .await
            .unwrap();
        assert_eq!(answer, "年滿20歲");

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("[1] 大型重型機車駕照須年滿二十歲"));
        assert!(prompts[0].contains("大型重型機車的駕照年齡限制"));
    }

    #[tokio::test]
    async fn test_plain_mode_has_no_evidence() {
        let client = Arc::new(EchoClient::default());
        let synth = LlmSynthesizer::new(client.clone(), "m", PromptCatalog::builtin().unwrap());

        synth.generate("今天天氣如何", None).await.unwrap();
        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("今天天氣如何"));
        assert!(!prompts[0].contains("[1]"));
    }

    #[tokio::test]
    async fn test_regenerate_samples_differently() {
        let client = Arc::new(EchoClient::default());
        let synth = LlmSynthesizer::new(client.clone(), "m", PromptCatalog::builtin().unwrap())
            .with_temperatures(0.3, 0.9);
        let docs = vec![Evidence::knowledge_base("大型重型機車駕照須年滿二十歲")];

        synth.generate("駕照年齡", Some(&docs)).await.unwrap();
        synth.regenerate("駕照年齡", &docs).await.unwrap();

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts[0], prompts[1]);
        let temperatures = client.temperatures.lock().unwrap();
        assert_eq!(*temperatures, vec![Some(0.3), Some(0.9)]);
    }

    #[tokio::test]
    async fn test_default_temperatures_differ() {
        let client = Arc::new(EchoClient::default());
        let synth = LlmSynthesizer::new(client.clone(), "m", PromptCatalog::builtin().unwrap());
        let docs = vec![Evidence::knowledge_base("doc")];

        synth.generate("q", Some(&docs)).await.unwrap();
        synth.regenerate("q", &docs).await.unwrap();

        let temperatures = client.temperatures.lock().unwrap();
        assert_eq!(temperatures[0], Some(DEFAULT_GENERATION_TEMPERATURE));
        assert_eq!(temperatures[1], Some(DEFAULT_REGENERATION_TEMPERATURE));
        assert_ne!(temperatures[0], temperatures[1]);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let synth = LlmSynthesizer::new(Arc::new(DownClient), "m", PromptCatalog::builtin().unwrap());
        let err = synth.generate("q", None).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }
}
