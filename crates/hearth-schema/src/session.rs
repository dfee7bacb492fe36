use anyhow::{bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::strategy::Strategy;

const SESSION_ID_LEN: usize = 13;
const SESSION_ID_MAX_LEN: usize = 128;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A contiguous span of a therapist reply with the techniques it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

impl Segment {
    pub fn new(text: impl Into<String>, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        Self {
            text: text.into(),
            strategies: strategies.into_iter().collect(),
        }
    }
}

/// Full reply text: segment texts in order, joined by a single space.
pub fn join_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "assistant")]
    Therapist,
}

impl Role {
    /// Role name in the generic two-role completion schema.
    pub fn as_llm_role(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Therapist => "assistant",
        }
    }

    /// Loose mapping used for caller-supplied history: anything that is not
    /// the user is the assistant side.
    pub fn from_loose(raw: &str) -> Self {
        match raw {
            "user" | "human" => Role::User,
            _ => Role::Therapist,
        }
    }
}

/// One message exchanged by either participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: now_millis(),
            segments: None,
        }
    }

    /// Therapist turn whose content is derived from its segments.
    pub fn therapist(segments: Vec<Segment>) -> Self {
        Self {
            role: Role::Therapist,
            content: join_segments(&segments),
            timestamp: now_millis(),
            segments: Some(segments),
        }
    }
}

/// An ordered transcript of turns sharing one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(with = "iso8601")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Turn>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: now_millis(),
            messages: Vec::new(),
        }
    }

    /// Append one completed round trip.
    pub fn append_exchange(&mut self, user: Turn, therapist: Turn) {
        self.messages.push(user);
        self.messages.push(therapist);
    }

    pub fn summary(&self, filename: Option<String>) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            message_count: self.messages.len(),
            filename,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(with = "iso8601")]
    pub started_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Sort newest first by `started_at`.
pub fn sort_newest_first(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}

/// Mint a 13 character lowercase base-36 session id.
pub fn mint_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Session ids end up in file names, so only a conservative alphabet is accepted.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("session id must not be empty");
    }
    if id.len() > SESSION_ID_MAX_LEN {
        bail!("session id exceeds {SESSION_ID_MAX_LEN} characters");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("session id contains unsupported characters: {id}");
    }
    Ok(())
}

/// Current instant truncated to millisecond precision, the resolution the
/// transcript documents carry.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub mod iso8601 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
