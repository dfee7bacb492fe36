use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use hearth_schema::{SessionEnvelope, SessionList};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{id}", get(get_session).delete(delete_session))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionList>, ApiError> {
    let sessions = state
        .controller
        .list_sessions()
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to list sessions"))?;
    Ok(Json(SessionList { sessions }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    let session = state
        .controller
        .get_session(&id)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to load session"))?;
    Ok(Json(SessionEnvelope { session }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .controller
        .delete_session(&id)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to delete session"))?;
    Ok(StatusCode::NO_CONTENT)
}
