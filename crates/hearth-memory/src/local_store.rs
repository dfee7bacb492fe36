use async_trait::async_trait;
use hearth_schema::{sort_newest_first, Session, SessionSummary};
use tracing::warn;

use crate::kv::KeyValueStore;
use crate::{StoreError, StoreResult, TranscriptStore};

/// Key holding the serialized array of every session.
pub const SESSIONS_KEY: &str = "hearth-chat-sessions";

/// Client-side transcript store: the whole session set lives as one JSON
/// array (newest first) under [`SESSIONS_KEY`].
pub struct LocalTranscriptStore<K> {
    kv: K,
    max_sessions: Option<usize>,
}

impl<K: KeyValueStore> LocalTranscriptStore<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            max_sessions: None,
        }
    }

    /// Keep at most `max` sessions; the oldest-stored are dropped on save.
    pub fn with_max_sessions(mut self, max: Option<usize>) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Every stored session in stored order. Unreadable content reads as empty.
    pub async fn all(&self) -> StoreResult<Vec<Session>> {
        let Some(raw) = self.kv.get(SESSIONS_KEY).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|error| {
            warn!(%error, "stored session set is unreadable; treating as empty");
            Vec::new()
        }))
    }

    async fn write(&self, sessions: &[Session]) -> StoreResult<()> {
        let raw = serde_json::to_string(sessions).map_err(StoreError::Serialize)?;
        self.kv.set(SESSIONS_KEY, &raw).await
    }

    pub async fn export_all(&self) -> StoreResult<String> {
        let sessions = self.all().await?;
        serde_json::to_string_pretty(&sessions).map_err(StoreError::Serialize)
    }

    pub async fn export(&self, session_id: &str) -> StoreResult<Option<String>> {
        match self.load(session_id).await? {
            Some(session) => serde_json::to_string_pretty(&session)
                .map(Some)
                .map_err(StoreError::Serialize),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<K: KeyValueStore> TranscriptStore for LocalTranscriptStore<K> {
    async fn load(&self, session_id: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .find(|s| s.session_id == session_id))
    }

    async fn save(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = self.all().await?;
        match sessions
            .iter()
            .position(|s| s.session_id == session.session_id)
        {
            Some(index) => sessions[index] = session.clone(),
            None => sessions.insert(0, session.clone()),
        }
        if let Some(max) = self.max_sessions {
            if sessions.len() > max {
                warn!(
                    dropped = sessions.len() - max,
                    "session capacity reached; dropping oldest stored sessions"
                );
                // The session being saved always survives eviction.
                let mut others = 0;
                sessions.retain(|s| {
                    if s.session_id == session.session_id {
                        return true;
                    }
                    others += 1;
                    others < max
                });
            }
        }
        self.write(&sessions).await
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .all()
            .await?
            .iter()
            .map(|s| s.summary(None))
            .collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        let mut sessions = self.all().await?;
        let before = sessions.len();
        sessions.retain(|s| s.session_id != session_id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.write(&sessions).await?;
        Ok(true)
    }
}
