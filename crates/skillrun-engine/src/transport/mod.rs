//! Tool provider sessions.
//!
//! Every transport kind yields a [`Session`] with the same four operations,
//! so the pool and router never know how a provider is reached. The three
//! JSON-RPC transports share the protocol logic in [`rpc`]; in-process
//! providers implement [`InProcessHandler`] directly.

mod http;
mod in_process;
mod poll_http;
mod process;
pub(crate) mod rpc;
mod stream_http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skillrun_core::{ProviderConfig, TransportConfig};

use crate::error::TransportError;

pub use in_process::{HandlerRegistry, InProcessHandler};

/// Client identity sent during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "skillrun".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What a provider declared in its `initialize` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCapabilities {
    pub protocol_version: String,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    /// Raw capability object.
    pub capabilities: Value,
}

/// A tool as listed by a provider, before it is tagged with the provider name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

/// Raw outcome of `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutput {
    /// Content blocks returned by the tool.
    pub content: Value,
    /// The tool itself reported failure.
    pub is_error: bool,
}

/// One live connection to one provider.
#[async_trait]
pub trait Session: Send + Sync {
    async fn initialize(
        &self,
        protocol_version: &str,
        client_info: &ClientInfo,
    ) -> Result<ServerCapabilities, TransportError>;

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, TransportError>;

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<CallOutput, TransportError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&self);

    /// Captured diagnostics (process stderr), if any.
    fn diagnostics(&self) -> Option<String> {
        None
    }
}

/// Open a session for `config`.
///
/// This only establishes the connection; the handshake is
/// [`Session::initialize`].
pub async fn open(
    config: &ProviderConfig,
    handlers: &HandlerRegistry,
    http_client: &reqwest::Client,
) -> Result<Arc<dyn Session>, TransportError> {
    let name = config.name.as_str();
    match &config.transport {
        TransportConfig::Process { command, args, env } => {
            let channel = process::ProcessChannel::spawn(name, command, args, env)?;
            Ok(Arc::new(rpc::RpcSession::new(name, channel)))
        }
        TransportConfig::StreamHttp { url, headers } => {
            let channel =
                stream_http::StreamHttpChannel::connect(name, http_client.clone(), url, headers)
                    .await?;
            Ok(Arc::new(rpc::RpcSession::new(name, channel)))
        }
        TransportConfig::PollHttp { url, headers } => {
            let channel = poll_http::PollHttpChannel::new(http_client.clone(), url, headers)?;
            Ok(Arc::new(rpc::RpcSession::new(name, channel)))
        }
        TransportConfig::InProcess { handle } => {
            let handler = handlers
                .get(handle)
                .ok_or_else(|| TransportError::UnknownHandle(handle.clone()))?;
            Ok(Arc::new(in_process::InProcessSession::new(handler)))
        }
    }
}
