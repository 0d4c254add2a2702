//! In-process providers: handlers registered by name, called directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{CallOutput, ClientInfo, ServerCapabilities, Session, ToolDefinition};
use crate::error::TransportError;

/// A tool provider living in this process.
#[async_trait]
pub trait InProcessHandler: Send + Sync {
    /// Handshake. The default accepts the client's protocol version.
    async fn initialize(
        &self,
        protocol_version: &str,
        _client_info: &ClientInfo,
    ) -> Result<ServerCapabilities, TransportError> {
        Ok(ServerCapabilities {
            protocol_version: protocol_version.to_string(),
            ..Default::default()
        })
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, TransportError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallOutput, TransportError>;
}

/// Handlers addressable from `in-process` provider configs.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn InProcessHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `handle`, replacing any previous one.
    pub fn register(&mut self, handle: impl Into<String>, handler: Arc<dyn InProcessHandler>) {
        self.handlers.insert(handle.into(), handler);
    }

    pub fn get(&self, handle: &str) -> Option<Arc<dyn InProcessHandler>> {
        self.handlers.get(handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handles", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) struct InProcessSession {
    handler: Arc<dyn InProcessHandler>,
    closed: AtomicBool,
}

impl InProcessSession {
    pub(crate) fn new(handler: Arc<dyn InProcessHandler>) -> Self {
        Self {
            handler,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::closed())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for InProcessSession {
    async fn initialize(
        &self,
        protocol_version: &str,
        client_info: &ClientInfo,
    ) -> Result<ServerCapabilities, TransportError> {
        self.ensure_open()?;
        self.handler.initialize(protocol_version, client_info).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, TransportError> {
        self.ensure_open()?;
        self.handler.list_tools().await
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<CallOutput, TransportError> {
        self.ensure_open()?;
        self.handler.call_tool(tool_name, arguments).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl InProcessHandler for Upper {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, TransportError> {
            Ok(vec![ToolDefinition {
                name: "upper".into(),
                description: "Uppercase text".into(),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn call_tool(&self, _name: &str, arguments: Value) -> Result<CallOutput, TransportError> {
            let text = arguments["text"].as_str().unwrap_or_default().to_uppercase();
            Ok(CallOutput {
                content: json!([{"type": "text", "text": text}]),
                is_error: false,
            })
        }
    }

    #[tokio::test]
    async fn registered_handler_serves_calls() {
        let mut registry = HandlerRegistry::new();
        registry.register("upper", Arc::new(Upper));
        let session = InProcessSession::new(registry.get("upper").unwrap());

        let caps = session
            .initialize("2025-03-26", &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(caps.protocol_version, "2025-03-26");

        let output = session.call("upper", json!({"text": "abc"})).await.unwrap();
        assert_eq!(output.content[0]["text"], "ABC");

        session.close().await;
        assert!(session.list_tools().await.is_err());
    }

    #[test]
    fn unknown_handle_is_absent() {
        assert!(HandlerRegistry::new().get("nope").is_none());
    }
}
