//! Error types for the model session SDK.

use thiserror::Error;

/// Errors that can occur while running a model session.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Model CLI executable not found.
    #[error("Model CLI not found at '{0}'. Ensure Claude Code is installed.")]
    ClaudeNotFound(String),

    /// Failed to spawn the model process.
    #[error("Failed to spawn model process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// Model process exited with an error.
    #[error("Model process exited with error: {0}")]
    ProcessError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Protocol error during communication.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The session is gone (process exited or session aborted).
    #[error("Channel closed")]
    ChannelClosed,
}
