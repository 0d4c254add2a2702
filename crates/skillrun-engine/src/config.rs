//! Engine configuration.

use std::time::Duration;

use crate::transport::ClientInfo;

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Server protocol versions accepted during the handshake.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on starting one provider (spawn/connect, handshake, discovery).
    pub provider_start_timeout: Duration,

    /// Bound on a single tool call.
    pub tool_call_timeout: Duration,

    /// Protocol version sent in `initialize`.
    pub protocol_version: String,

    /// Client identity sent in `initialize`.
    pub client_info: ClientInfo,

    /// Capacity of the channel carrying events to the stream consumer.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_start_timeout: Duration::from_secs(30),
            tool_call_timeout: Duration::from_secs(120),
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
            event_capacity: 64,
        }
    }
}

/// Whether a server-declared protocol version is one we can talk to.
pub fn is_supported_protocol_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}
