//! Error taxonomy shared by the store, session manager and completion client.

use thiserror::Error;

/// Convenience alias used throughout the core.
pub type ChatResult<T> = Result<T, ChatError>;

/// Which quota bucket a send was charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageTier {
    Standard,
    Premium,
}

impl std::fmt::Display for UsageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageTier::Standard => write!(f, "standard"),
            UsageTier::Premium => write!(f, "premium"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    /// A conversation, system prompt, attachment or provider lookup missed.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("model '{model}' is not offered by provider '{provider}'")]
    UnsupportedModel { provider: String, model: String },

    #[error("no model selected; pick a provider and model first")]
    NoActiveModel,

    #[error("{tier} usage limit of {limit} messages reached; it resets on the next weekly cycle")]
    LimitReached { tier: UsageTier, limit: u32 },

    /// Non-success HTTP response from the completion endpoint.
    #[error("API request failed with status {status}: {body}")]
    Provider { status: u16, body: String },

    /// A single malformed stream record. Recoverable: the stream continues.
    #[error("malformed stream record: {0}")]
    Parse(String),

    #[error("storage quota exceeded")]
    StorageQuotaExceeded,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stream cancelled")]
    Cancelled,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ChatError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ChatError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ChatError::StorageQuotaExceeded)
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}
