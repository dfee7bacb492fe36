use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_schema::{
    iso8601, now_millis, sort_newest_first, validate_session_id, Session, SessionSummary,
};
use tracing::{debug, warn};

use crate::{StoreError, StoreResult, TranscriptStore};

pub const DEFAULT_TRANSCRIPTS_DIR: &str = "transcripts";

const FILE_PREFIX: &str = "session-";
const FILE_SUFFIX: &str = ".json";
/// Length of `2024-11-02T10-15-30-123Z`.
const STAMP_LEN: usize = 24;

/// One pretty-printed JSON document per session, named
/// `session-<stamp>-<sessionId>.json`.
///
/// Concurrent writers to the same session are not arbitrated; the last write wins.
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Locate the document for `session_id`, if any. A missing directory is
    /// treated as an empty store.
    async fn find_existing(&self, session_id: &str) -> StoreResult<Option<PathBuf>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StoreError::io(&self.dir, error)),
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if session_id_from_file_name(name) == Some(session_id) {
                return Ok(Some(entry.path()));
            }
        }

        Ok(None)
    }
}

/// `2024-11-02T10:15:30.123Z` becomes `2024-11-02T10-15-30-123Z`.
pub fn file_stamp(at: &DateTime<Utc>) -> String {
    iso8601::format(at).replace([':', '.'], "-")
}

pub fn file_name_for(session_id: &str, at: &DateTime<Utc>) -> String {
    format!("{FILE_PREFIX}{}-{session_id}{FILE_SUFFIX}", file_stamp(at))
}

/// Extract the session id embedded in a transcript file name.
pub fn session_id_from_file_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    if rest.len() <= STAMP_LEN + 1 || !rest.is_char_boundary(STAMP_LEN) {
        return None;
    }
    let (stamp, tail) = rest.split_at(STAMP_LEN);
    if !stamp.ends_with('Z') {
        return None;
    }
    tail.strip_prefix('-')
}

fn is_transcript_file(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn load(&self, session_id: &str) -> StoreResult<Option<Session>> {
        if validate_session_id(session_id).is_err() {
            return Ok(None);
        }
        let Some(path) = self.find_existing(session_id).await? else {
            return Ok(None);
        };

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        let session = serde_json::from_str::<Session>(&raw).map_err(|source| {
            StoreError::Malformed {
                location: path.display().to_string(),
                source,
            }
        })?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> StoreResult<()> {
        validate_session_id(&session.session_id)
            .map_err(|e| StoreError::InvalidSessionId(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let path = match self.find_existing(&session.session_id).await? {
            Some(path) => path,
            None => self
                .dir
                .join(file_name_for(&session.session_id, &now_millis())),
        };

        let body = serde_json::to_string_pretty(session).map_err(StoreError::Serialize)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        debug!(
            session_id = %session.session_id,
            messages = session.messages.len(),
            path = %path.display(),
            "saved transcript"
        );
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::io(&self.dir, error)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_transcript_file(&name) {
                continue;
            }

            let raw = match tokio::fs::read_to_string(entry.path()).await {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(file = %name, %error, "skipping unreadable transcript");
                    continue;
                }
            };
            match serde_json::from_str::<Session>(&raw) {
                Ok(session) => summaries.push(session.summary(Some(name))),
                Err(error) => warn!(file = %name, %error, "skipping malformed transcript"),
            }
        }

        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        if validate_session_id(session_id).is_err() {
            return Ok(false);
        }
        let Some(path) = self.find_existing(session_id).await? else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
