//! Engine error types.

use std::time::Duration;

use thiserror::Error;

use skillrun_claude_sdk::SdkError;
use skillrun_store::StoreError;

/// Provider configuration could not be resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Provider '{provider}' references unresolved variable ${{{variable}}}")]
    UnresolvedVariable { provider: String, variable: String },

    #[error("Provider '{provider}' is malformed: {reason}")]
    Malformed { provider: String, reason: String },
}

/// Failures talking to a tool provider.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed{}", .stderr.as_ref().map(|s| format!("; stderr:\n{}", s)).unwrap_or_default())]
    ConnectionClosed { stderr: Option<String> },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Incompatible protocol version '{0}'")]
    IncompatibleVersion(String),

    #[error("No in-process handler registered as '{0}'")]
    UnknownHandle(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    pub(crate) fn closed() -> Self {
        Self::ConnectionClosed { stderr: None }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// A provider that did not make it into the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Provider '{provider}' failed to start: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

/// Failures of the content backend.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    #[error("Content backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Errors that end a run as `failed`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Model session error: {0}")]
    Model(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SdkError> for RunError {
    fn from(err: SdkError) -> Self {
        Self::Model(err.to_string())
    }
}
