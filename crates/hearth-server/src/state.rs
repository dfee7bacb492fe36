use std::sync::Arc;

use hearth_core::SessionController;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
}

impl AppState {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }

    /// `server` when transcripts are kept here, `client` otherwise.
    pub fn persistence(&self) -> &'static str {
        if self.controller.is_stateful() {
            "server"
        } else {
            "client"
        }
    }
}
