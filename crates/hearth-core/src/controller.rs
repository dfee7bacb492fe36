use std::sync::Arc;

use hearth_memory::TranscriptStore;
use hearth_schema::{
    mint_session_id, validate_session_id, ChatRequest, ChatResponse, HistoryEntry, Role, Session,
    SessionSummary, Turn,
};
use tracing::{info, warn};

use crate::error::ChatError;
use crate::gateway::CompletionGateway;

/// Runs one chat exchange per request.
///
/// With a store the controller owns the transcript; without one the caller
/// supplies the prior turns as `conversationHistory` and keeps them itself.
pub struct SessionController {
    gateway: CompletionGateway,
    store: Option<Arc<dyn TranscriptStore>>,
}

impl SessionController {
    pub fn new(gateway: CompletionGateway, store: Option<Arc<dyn TranscriptStore>>) -> Self {
        Self { gateway, store }
    }

    pub fn stateful(gateway: CompletionGateway, store: Arc<dyn TranscriptStore>) -> Self {
        Self::new(gateway, Some(store))
    }

    pub fn stateless(gateway: CompletionGateway) -> Self {
        Self::new(gateway, None)
    }

    pub fn is_stateful(&self) -> bool {
        self.store.is_some()
    }

    pub fn gateway(&self) -> &CompletionGateway {
        &self.gateway
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let message = request
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ChatError::validation("Message is required"))?
            .to_string();

        // An empty id counts as absent and starts a new session.
        let session_id = match request.session_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                validate_session_id(&id).map_err(|e| ChatError::validation(e.to_string()))?;
                id
            }
            None => mint_session_id(),
        };

        let result = match &self.store {
            Some(store) => self.handle_stateful(store.as_ref(), &session_id, message).await,
            None => {
                let history = request.conversation_history.unwrap_or_default();
                self.handle_stateless(&session_id, &history, message).await
            }
        };

        match &result {
            Ok(response) => info!(
                session_id = %session_id,
                segments = response.segments.len(),
                "chat exchange completed"
            ),
            Err(error) => warn!(session_id = %session_id, %error, "chat exchange failed"),
        }
        result
    }

    async fn handle_stateful(
        &self,
        store: &dyn TranscriptStore,
        session_id: &str,
        message: String,
    ) -> Result<ChatResponse, ChatError> {
        let mut session = store
            .load(session_id)
            .await?
            .unwrap_or_else(|| Session::new(session_id));

        let user = Turn::user(message);
        let completion = self.gateway.complete(&session.messages, &user.content).await?;
        let therapist = Turn::therapist(completion.segments.clone());

        session.append_exchange(user, therapist);
        store.save(&session).await?;

        Ok(ChatResponse {
            session_id: session.session_id,
            content: completion.content,
            segments: completion.segments,
        })
    }

    async fn handle_stateless(
        &self,
        session_id: &str,
        history: &[HistoryEntry],
        message: String,
    ) -> Result<ChatResponse, ChatError> {
        let prior: Vec<Turn> = history
            .iter()
            .map(|entry| {
                let mut turn = Turn::user(entry.content.clone());
                turn.role = Role::from_loose(&entry.role);
                turn
            })
            .collect();

        let completion = self.gateway.complete(&prior, &message).await?;
        Ok(ChatResponse {
            session_id: session_id.to_string(),
            content: completion.content,
            segments: completion.segments,
        })
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        match &self.store {
            Some(store) => Ok(store.list().await?),
            None => Ok(Vec::new()),
        }
    }

    /// A document that exists but cannot be parsed is reported as not found.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, ChatError> {
        let not_found = || ChatError::NotFound(session_id.to_string());
        let Some(store) = &self.store else {
            return Err(not_found());
        };
        match store.load(session_id).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(not_found()),
            Err(error) if error.is_malformed() => {
                warn!(session_id, %error, "session document is unreadable");
                Err(not_found())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ChatError> {
        let Some(store) = &self.store else {
            return Err(ChatError::NotFound(session_id.to_string()));
        };
        if store.delete(session_id).await? {
            info!(session_id, "session deleted");
            Ok(())
        } else {
            Err(ChatError::NotFound(session_id.to_string()))
        }
    }
}
