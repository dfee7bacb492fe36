pub mod chat;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/chat", chat::router())
        .nest("/sessions", sessions::router())
        .nest("/health", health::router())
}
