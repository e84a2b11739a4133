//! Builds the workflow and its collaborators from configuration.

use motolaw_core::{config::AppConfig, AppError, AppResult};
use motolaw_history::{HistoryStore, SqliteHistory};
use motolaw_knowledge::{KnowledgeBase, WebSearchClient};
use motolaw_llm::create_client;
use motolaw_prompt::PromptCatalog;
use motolaw_workflow::{
    KnowledgeBaseSource, LlmJudge, LlmSynthesizer, Orchestrator, WebSearchSource,
};
use std::sync::Arc;
use std::time::Duration;

/// Open the history database unless persistence is disabled.
pub fn open_history(config: &AppConfig) -> AppResult<Option<Arc<SqliteHistory>>> {
    if config.history.disabled {
        tracing::debug!("Conversation history disabled");
        return Ok(None);
    }

    let path = config.history_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = SqliteHistory::open(&path, config.history.retain as usize)?;
    tracing::debug!(path = %path.display(), retain = config.history.retain, "Opened history store");
    Ok(Some(Arc::new(store)))
}

/// Wire an orchestrator for the configured provider, base and search API.
pub fn build_orchestrator(
    config: &AppConfig,
    history: Option<Arc<dyn HistoryStore>>,
) -> AppResult<Orchestrator> {
    config.validate()?;

    let endpoint = config.resolve_endpoint();
    let api_key = config.resolve_api_key(&config.provider);
    let client = create_client(
        &config.provider,
        endpoint.as_deref(),
        api_key.as_deref(),
        config.resolve_llm_timeout(),
    )
    .map_err(AppError::Config)?;

    let prompts = PromptCatalog::load(&config.workspace)?;
    let judge = LlmJudge::new(client.clone(), &config.model, prompts.clone());
    let synthesizer = LlmSynthesizer::new(client, &config.model, prompts).with_temperatures(
        config.workflow.generation_temperature,
        config.workflow.regeneration_temperature,
    );

    let base = KnowledgeBase::open(
        &config.workspace,
        &config.knowledge.base,
        config.knowledge.top_k as usize,
    )?;

    let web = match config.resolve_search_api_key() {
        Some(key) => WebSearchSource::new(WebSearchClient::new(
            &config.search.endpoint,
            key,
            config.search.max_results,
            Duration::from_secs(config.search.timeout_secs),
        )?),
        None => {
            tracing::warn!(
                "{} is not set; web search will return no results",
                config.search.api_key_env
            );
            WebSearchSource::disabled()
        }
    };

    let mut builder = Orchestrator::builder()
        .judge(Arc::new(judge))
        .knowledge(Arc::new(KnowledgeBaseSource::new(base)))
        .web(Arc::new(web))
        .synthesizer(Arc::new(synthesizer))
        .call_timeout(Duration::from_secs(config.workflow.call_timeout_secs));

    if let Some(history) = history {
        builder = builder.history(history);
    }

    tracing::info!(
        provider = %config.provider,
        model = %config.model,
        base = %config.knowledge.base,
        "Workflow ready"
    );
    builder.build()
}
