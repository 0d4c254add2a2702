//! JSON-RPC framing shared by the process and HTTP transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{CallOutput, ClientInfo, ServerCapabilities, Session, ToolDefinition};
use crate::error::TransportError;

/// Upper bound on `tools/list` pages followed for one provider.
const MAX_LIST_PAGES: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    method: &'a str,
    params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub(crate) fn request(id: i64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        }
    }

    pub(crate) fn notification(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Any inbound message: response, notification or server request.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    /// Numeric id of a response, `None` for notifications and requests.
    pub(crate) fn response_id(&self) -> Option<i64> {
        if self.method.is_some() {
            return None;
        }
        match self.id.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// True for a request the server sends to us.
    pub(crate) fn is_server_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    pub(crate) fn into_result(self) -> Result<Value, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Server {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Our answer to a server-initiated request: `ping` succeeds, anything
/// else is "method not found".
pub(crate) fn reply_to_server_request(message: &JsonRpcMessage) -> Value {
    let id = message.id.clone().unwrap_or(Value::Null);
    match message.method.as_deref() {
        Some("ping") => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
        method => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("Method not found: {}", method.unwrap_or_default())},
        }),
    }
}

/// Find the response to `request_id` in a body holding one message or a batch.
pub(crate) fn find_response(
    body: Value,
    request_id: i64,
) -> Result<Option<Result<Value, TransportError>>, TransportError> {
    let items = match body {
        Value::Array(items) => items,
        other => vec![other],
    };
    for item in items {
        let message: JsonRpcMessage = match serde_json::from_value(item) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed message in batch");
                continue;
            }
        };
        if message.response_id() == Some(request_id) {
            return Ok(Some(message.into_result()));
        }
    }
    Ok(None)
}

type Responder = oneshot::Sender<Result<Value, TransportError>>;

/// Requests awaiting a response, keyed by id.
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_id: AtomicI64,
    waiting: Mutex<HashMap<i64, Responder>>,
    closed: AtomicBool,
}

impl PendingRequests {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        })
    }

    /// Allocate an id and a slot for its response.
    pub(crate) fn register(self: &Arc<Self>) -> Result<PendingResponse, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::closed());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        Ok(PendingResponse {
            id,
            rx,
            pending: Arc::clone(self),
        })
    }

    /// Deliver a response. Unknown ids (late or cancelled calls) are dropped.
    pub(crate) fn resolve(&self, id: i64, result: Result<Value, TransportError>) {
        match self.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(id, "Response for unknown request id"),
        }
    }

    /// Fail every waiting request and refuse new ones.
    pub(crate) fn close(&self, stderr: Option<String>) {
        self.closed.store(true, Ordering::SeqCst);
        self.fail_waiting(stderr);
    }

    /// Fail every waiting request; new ones are still accepted.
    pub(crate) fn fail_waiting(&self, stderr: Option<String>) {
        let waiting: Vec<Responder> = self.lock().drain().map(|(_, tx)| tx).collect();
        for tx in waiting {
            let _ = tx.send(Err(TransportError::ConnectionClosed {
                stderr: stderr.clone(),
            }));
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Responder>> {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registered request. Dropping it forgets the id.
pub(crate) struct PendingResponse {
    pub id: i64,
    rx: oneshot::Receiver<Result<Value, TransportError>>,
    pending: Arc<PendingRequests>,
}

impl PendingResponse {
    pub(crate) async fn wait(mut self) -> Result<Value, TransportError> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::closed()),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Moves JSON-RPC messages to and from one provider.
#[async_trait]
pub(crate) trait RpcChannel: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError>;

    async fn close(&self);

    fn diagnostics(&self) -> Option<String> {
        None
    }
}

/// Protocol logic on top of any [`RpcChannel`].
pub(crate) struct RpcSession<C> {
    provider: String,
    channel: C,
}

impl<C: RpcChannel> RpcSession<C> {
    pub(crate) fn new(provider: &str, channel: C) -> Self {
        Self {
            provider: provider.to_string(),
            channel,
        }
    }
}

/// Parse an `initialize` result.
pub(crate) fn parse_capabilities(result: &Value) -> Result<ServerCapabilities, TransportError> {
    let protocol_version = result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Protocol("initialize result lacks protocolVersion".into()))?;
    let info = result.get("serverInfo");
    Ok(ServerCapabilities {
        protocol_version: protocol_version.to_string(),
        server_name: info
            .and_then(|i| i.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        server_version: info
            .and_then(|i| i.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string),
        capabilities: result.get("capabilities").cloned().unwrap_or(Value::Null),
    })
}

/// Parse listed tools, dropping entries that are not well formed.
pub(crate) fn parse_tools(provider: &str, tools: Vec<Value>) -> Vec<ToolDefinition> {
    tools
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<ToolDefinition>(raw) {
            Ok(tool) if tool.name.trim().is_empty() => {
                warn!(provider, "Dropping tool with empty name");
                None
            }
            Ok(tool) if !(tool.input_schema.is_object() || tool.input_schema.is_boolean()) => {
                warn!(provider, tool = %tool.name, "Dropping tool with non-object input schema");
                None
            }
            Ok(tool) => Some(tool),
            Err(e) => {
                warn!(provider, error = %e, "Dropping malformed tool descriptor");
                None
            }
        })
        .collect()
}

#[async_trait]
impl<C: RpcChannel> Session for RpcSession<C> {
    async fn initialize(
        &self,
        protocol_version: &str,
        client_info: &ClientInfo,
    ) -> Result<ServerCapabilities, TransportError> {
        let params = json!({
            "protocolVersion": protocol_version,
            "capabilities": {},
            "clientInfo": client_info,
        });
        let result = self.channel.request("initialize", params).await?;
        let capabilities = parse_capabilities(&result)?;
        if let Err(e) = self
            .channel
            .notify("notifications/initialized", json!({}))
            .await
        {
            debug!(provider = %self.provider, error = %e, "initialized notification not delivered");
        }
        Ok(capabilities)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, TransportError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.channel.request("tools/list", params).await?;
            let page = match result.get("tools") {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(TransportError::Protocol(
                        "tools/list result lacks a tools array".into(),
                    ))
                }
            };
            tools.extend(parse_tools(&self.provider, page));

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(tools);
            }
        }

        warn!(provider = %self.provider, "tools/list pagination truncated");
        Ok(tools)
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<CallOutput, TransportError> {
        let params = json!({ "name": tool_name, "arguments": arguments });
        let result = self.channel.request("tools/call", params).await?;
        Ok(CallOutput {
            is_error: result
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            content: result.get("content").cloned().unwrap_or(Value::Null),
        })
    }

    async fn close(&self) {
        self.channel.close().await;
    }

    fn diagnostics(&self) -> Option<String> {
        self.channel.diagnostics()
    }
}
