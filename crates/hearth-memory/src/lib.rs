//! Transcript persistence.
//!
//! Two interchangeable backends implement [`TranscriptStore`]:
//! [`FileTranscriptStore`] keeps one pretty-printed JSON document per session
//! in a directory, and [`LocalTranscriptStore`] keeps every session as one
//! serialized array under a fixed key of a [`KeyValueStore`].

pub mod file_store;
pub mod kv;
pub mod local_store;

use std::path::PathBuf;

use async_trait::async_trait;
use hearth_schema::{Session, SessionSummary};

pub use file_store::{FileTranscriptStore, DEFAULT_TRANSCRIPTS_DIR};
pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use local_store::{LocalTranscriptStore, SESSIONS_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed session document {location}: {source}")]
    Malformed {
        location: String,
        source: serde_json::Error,
    },
    #[error("failed to serialize sessions: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence contract shared by the server-side and client-side backends.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// `Ok(None)` when no session with this id has been persisted.
    async fn load(&self, session_id: &str) -> StoreResult<Option<Session>>;

    /// Idempotent per session id: a second save replaces the first.
    async fn save(&self, session: &Session) -> StoreResult<()>;

    /// Summaries sorted by `startedAt`, newest first.
    async fn list(&self) -> StoreResult<Vec<SessionSummary>>;

    /// Returns whether a session was removed.
    async fn delete(&self, session_id: &str) -> StoreResult<bool>;
}
