use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use hearth_schema::{ChatRequest, ChatResponse};

use crate::error::ApiError;
use crate::state::AppState;

const CHAT_FAILURE: &str = "Failed to process chat message";

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(chat))
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected chat body");
        ApiError::bad_request("Message is required")
    })?;

    state
        .controller
        .handle(request)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_chat(e, CHAT_FAILURE))
}
