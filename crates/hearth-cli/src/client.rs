use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hearth_memory::{FileKvStore, LocalTranscriptStore, TranscriptStore};
use hearth_schema::{
    ChatRequest, ChatResponse, ErrorBody, Session, SessionEnvelope, SessionList, SessionSummary,
};
use reqwest::StatusCode;

pub type LocalStore = LocalTranscriptStore<FileKvStore>;

/// Talks to a running hearth server.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse>;
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, session_id: &str) -> Result<bool>;
}

pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }
}

/// Turn a non-success response into an error carrying the server's message.
async fn api_error(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => anyhow!("server error ({status}): {}", body.error),
        Err(_) => anyhow!("server error ({status})"),
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let resp = self
            .client
            .post(self.url("/chat"))
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let resp = self
            .client
            .get(self.url("/sessions"))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let list: SessionList = resp.json().await?;
        Ok(list.sessions)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let resp = self
            .client
            .get(self.url(&format!("/sessions/{session_id}")))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let envelope: SessionEnvelope = resp.json().await?;
                Ok(Some(envelope.session))
            }
            _ => Err(api_error(resp).await),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let resp = self
            .client
            .delete(self.url(&format!("/sessions/{session_id}")))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(api_error(resp).await),
        }
    }
}

/// Where saved sessions are browsed from: the server's API, or the local
/// store when transcripts are kept by the client.
#[derive(Clone)]
pub enum SessionSource {
    Remote(Arc<dyn ChatClient>),
    Local(Arc<LocalStore>),
}

impl SessionSource {
    pub async fn list(&self) -> Result<Vec<SessionSummary>> {
        match self {
            Self::Remote(client) => client.list_sessions().await,
            Self::Local(store) => Ok(store.list().await?),
        }
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        match self {
            Self::Remote(client) => client.get_session(session_id).await,
            Self::Local(store) => Ok(store.load(session_id).await?),
        }
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        match self {
            Self::Remote(client) => client.delete_session(session_id).await,
            Self::Local(store) => Ok(store.delete(session_id).await?),
        }
    }

    /// Pretty JSON of one session, or of every session when `session_id` is
    /// `None`. `Ok(None)` when the named session does not exist.
    pub async fn export(&self, session_id: Option<&str>) -> Result<Option<String>> {
        match (self, session_id) {
            (Self::Local(store), Some(id)) => Ok(store.export(id).await?),
            (Self::Local(store), None) => Ok(Some(store.export_all().await?)),
            (Self::Remote(client), Some(id)) => match client.get_session(id).await? {
                Some(session) => Ok(Some(serde_json::to_string_pretty(&session)?)),
                None => Ok(None),
            },
            (Self::Remote(client), None) => {
                let mut sessions = Vec::new();
                for summary in client.list_sessions().await? {
                    if let Some(session) = client.get_session(&summary.session_id).await? {
                        sessions.push(session);
                    }
                }
                Ok(Some(serde_json::to_string_pretty(&sessions)?))
            }
        }
    }
}
