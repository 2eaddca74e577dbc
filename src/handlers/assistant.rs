use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::ConversationContext;
use crate::services::pipeline::{ConfirmOutcome, UtteranceOutcome};
use crate::state::AppState;

const DEFAULT_USER: &str = "default";
const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub user_id: Option<String>,
    #[serde(default)]
    pub text: String,
    pub lang: Option<String>,
}

pub async fn process(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProcessRequest>,
) -> Json<UtteranceOutcome> {
    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER);
    let lang = body.lang.as_deref().unwrap_or(DEFAULT_LANGUAGE);

    let outcome = state
        .assistant
        .handle_utterance(user_id, &body.text, lang)
        .await;
    Json(outcome)
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub user_id: Option<String>,
    pub action: String,
    pub confirmed: bool,
}

pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConfirmRequest>,
) -> Json<ConfirmOutcome> {
    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER);
    Json(
        state
            .assistant
            .confirm(user_id, &body.action, body.confirmed)
            .await,
    )
}

pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ConversationContext>, AppError> {
    state
        .assistant
        .planner()
        .context(&user_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no context for {user_id}")))
}

pub async fn clear_context(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cleared = state.assistant.clear_context(&user_id).await?;
    tracing::info!(user_id = %user_id, cleared, "context cleared");
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}
