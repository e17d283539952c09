//! Top-level error types for ticketrelay.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Process configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persisted state document errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read state from {path}: {source}")]
    Read {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("state document {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    #[error("failed to persist state: {0}")]
    Persist(String),
}

/// Malformed user input on a configuration command. Surfaced to the actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("'{value}' is not a valid id list (expected comma-separated integers)")]
    InvalidIdList { value: String },

    #[error("'{value}' is not a valid id")]
    InvalidId { value: String },

    #[error("timezone must be an integer hour offset, got '{value}'")]
    InvalidTimezone { value: String },

    #[error("timezone offset {offset} is outside -12..=14")]
    TimezoneOutOfRange { offset: i32 },

    #[error("at most {max} monitor channels may be configured, got {count}")]
    TooManyMonitorChannels { count: usize, max: usize },

    #[error("{field} must be a positive integer, got '{value}'")]
    NotPositive { field: &'static str, value: String },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
}

/// Conversation fetch failures raised by the source platform collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("channel {channel_id} not found")]
    ChannelNotFound { channel_id: u64 },

    #[error("platform request failed: {0}")]
    Platform(String),
}

/// Analysis failures. Both variants leave the channel idle with no result.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("model response did not match the expected schema: {0}")]
    MalformedResponse(String),

    #[error("model call failed: {0}")]
    TransportFailure(String),

    #[error("failed to render prompt: {0}")]
    Prompt(String),
}

/// Delivery failures reported by the destination platform adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("transient delivery failure to {target}: {message}")]
    Transient { target: String, message: String },

    #[error("permanent delivery failure to {target}: {message}")]
    Permanent { target: String, message: String },
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient { .. })
    }
}

/// The actor lacked the role or platform privilege a command requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("you are not allowed to run this command ({required} access required)")]
pub struct AuthorizationError {
    pub required: crate::access::AccessLevel,
}

/// Secrets and credential errors.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("failed to encrypt secret: {0}")]
    EncryptionFailed(String),

    #[error("failed to decrypt secret: {0}")]
    DecryptionFailed(String),

    #[error("invalid key format")]
    InvalidKey,
}

/// LLM provider errors raised by the completion collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key for the language model")]
    MissingApiKey,

    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("provider returned an empty completion")]
    EmptyCompletion,
}
