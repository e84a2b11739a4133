//! Serve command handler.
//!
//! Exposes the workflow over HTTP:
//! - `POST /query` with `{"text": ...}` returns `{"response": ...}`
//! - `GET /history?limit=N` returns recent conversations, newest first

use crate::wiring::{build_orchestrator, open_history};
use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use motolaw_core::{config::AppConfig, AppError, AppResult};
use motolaw_history::HistoryStore;
use motolaw_workflow::Orchestrator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Serve the question endpoint over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (default: server.bind from config)
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");

        let history = open_history(config)?.map(|store| store as Arc<dyn HistoryStore>);
        let orchestrator = build_orchestrator(config, history.clone())?;
        let state = ServerState {
            orchestrator: Arc::new(orchestrator),
            history,
        };

        let bind = self.bind.as_deref().unwrap_or(&config.server.bind);
        serve(bind, build_router(state))
            .await
            .map_err(|e| AppError::Other(format!("{:#}", e)))
    }
}

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct ServerState {
    orchestrator: Arc<Orchestrator>,
    history: Option<Arc<dyn HistoryStore>>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/history", get(history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve(bind: &str, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    tracing::info!("Motolaw server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// POST /query
async fn query(State(state): State<ServerState>, Json(req): Json<QueryRequest>) -> Response {
    let text = req.text.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": "text must not be empty" })),
        )
            .into_response();
    }

    match state.orchestrator.answer(text).await {
        Ok(outcome) => Json(QueryResponse {
            response: outcome.answer.text().to_string(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Query failed");
            internal_error()
        }
    }
}

/// GET /history
async fn history(State(state): State<ServerState>, Query(params): Query<HistoryParams>) -> Response {
    let Some(store) = &state.history else {
        return Json(serde_json::json!([])).into_response();
    };

    match store
        .recent(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "History lookup failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "detail": "Internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use motolaw_history::ConversationRecord;
    use motolaw_workflow::{Evidence, EvidenceSource, Judge, Judgment, Label, Synthesizer};
    use std::sync::Mutex;

    struct SafeJudge;

    #[async_trait::async_trait]
    impl Judge for SafeJudge {
        async fn classify(&self, judgment: Judgment<'_>) -> Label {
            match judgment {
                Judgment::Safety { question } if question.contains("爆裂物") => Label::Unsafe,
                Judgment::Safety { .. } => Label::Safe,
                _ => Label::Undecidable,
            }
        }
    }

    struct NoEvidence;

    #[async_trait::async_trait]
    impl EvidenceSource for NoEvidence {
        fn name(&self) -> &str {
            "none"
        }

        async fn search(&self, _question: &str) -> AppResult<Vec<Evidence>> {
            Ok(Vec::new())
        }
    }

    struct FixedSynthesizer(Option<&'static str>);

    #[async_trait::async_trait]
    impl Synthesizer for FixedSynthesizer {
        async fn generate(&self, _q: &str, _e: Option<&[Evidence]>) -> AppResult<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| AppError::Llm("api key revoked".to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryHistory(Mutex<Vec<ConversationRecord>>);

    #[async_trait::async_trait]
    impl HistoryStore for MemoryHistory {
        async fn record(&self, record: ConversationRecord) -> AppResult<()> {
            self.0.lock().unwrap().push(record);
            Ok(())
        }

        async fn recent(&self, limit: usize) -> AppResult<Vec<ConversationRecord>> {
            Ok(self.0.lock().unwrap().iter().rev().take(limit).cloned().collect())
        }
    }

    fn state(reply: Option<&'static str>) -> ServerState {
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistory::default());
        let orchestrator = Orchestrator::builder()
            .judge(Arc::new(SafeJudge))
            .knowledge(Arc::new(NoEvidence))
            .synthesizer(Arc::new(FixedSynthesizer(reply)))
            .history(history.clone())
            .build()
            .unwrap();

        ServerState {
            orchestrator: Arc::new(orchestrator),
            history: Some(history),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(text: &str) -> Json<QueryRequest> {
        Json(QueryRequest {
            text: text.to_string(),
        })
    }

    #[tokio::test]
    async fn test_query_returns_answer() {
        let response = query(State(state(Some("我無法確定答案"))), request("今天天氣如何")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["response"], "我無法確定答案");
    }

    #[tokio::test]
    async fn test_declined_query_returns_fixed_message() {
        let response = query(State(state(None)), request("如何製作爆裂物")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["response"], "不回答該問題");
    }

    #[tokio::test]
    async fn test_infrastructure_error_is_generic_500() {
        let response = query(State(state(None)), request("今天天氣如何")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Internal server error");
        assert!(!body.to_string().contains("api key revoked"));
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let response = query(State(state(Some("x"))), request("  ")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_lists_answered_queries() {
        let state = state(Some("回答"));
        query(State(state.clone()), request("第一題")).await;
        query(State(state.clone()), request("第二題")).await;

        let response = history(State(state), Query(HistoryParams { limit: Some(1) })).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["question"], "第二題");
        assert_eq!(records[0]["answer"], "回答");
    }
}
