use hearth_memory::StoreError;
use thiserror::Error;

/// Failures of a single completion round trip.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider returned no content")]
    EmptyCompletion,

    #[error("provider returned an unusable completion: {0}")]
    InvalidCompletion(String),

    #[error("provider request failed: {0:#}")]
    Provider(#[source] anyhow::Error),
}

/// Failures surfaced by the session controller.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or malformed request field.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] GatewayError),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
