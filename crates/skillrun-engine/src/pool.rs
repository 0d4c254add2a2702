//! Provider sessions of one run and tool execution through them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skillrun_core::{content_text, ProviderConfig, ToolCall, ToolDescriptor, ToolErrorKind, ToolResult};

use crate::config::{is_supported_protocol_version, EngineConfig};
use crate::error::{ProviderError, TransportError};
use crate::transport::{self, HandlerRegistry, Session, ToolDefinition};

/// Executes tool calls on behalf of a run.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Resolve `call` exactly once. Failures come back as error results.
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    validator: jsonschema::Validator,
    session: Arc<dyn Session>,
}

/// The sessions of one run. Never shared across runs.
pub struct ProviderPool {
    config: EngineConfig,
    handlers: HandlerRegistry,
    http: reqwest::Client,
    sessions: Mutex<Vec<(String, Arc<dyn Session>)>>,
    tools: HashMap<String, RegisteredTool>,
    catalog: Vec<ToolDescriptor>,
}

impl ProviderPool {
    pub fn new(config: EngineConfig, handlers: HandlerRegistry, http: reqwest::Client) -> Self {
        Self {
            config,
            handlers,
            http,
            sessions: Mutex::new(Vec::new()),
            tools: HashMap::new(),
            catalog: Vec::new(),
        }
    }

    /// Start every provider concurrently and build the tool catalog.
    ///
    /// Each provider gets its own start timeout. Providers that fail are
    /// reported in the error list and contribute no tools. When two
    /// providers offer the same tool name, the one earlier in `providers`
    /// keeps it.
    pub async fn start(
        &mut self,
        providers: &[ProviderConfig],
    ) -> (Vec<ToolDescriptor>, Vec<ProviderError>) {
        let timeout = self.config.provider_start_timeout;
        let this = &*self;
        let starts = providers.iter().map(|provider| async move {
            match tokio::time::timeout(timeout, this.start_one(provider)).await {
                Ok(result) => result,
                Err(_) => Err(format!("start: {}", TransportError::Timeout(timeout))),
            }
        });
        let outcomes = join_all(starts).await;

        let mut errors = Vec::new();
        for (provider, outcome) in providers.iter().zip(outcomes) {
            match outcome {
                Ok((session, tools)) => {
                    info!(provider = %provider.name, tools = tools.len(), "Provider ready");
                    self.register(&provider.name, session, tools);
                }
                Err(message) => {
                    warn!(provider = %provider.name, error = %message, "Provider failed to start");
                    errors.push(ProviderError {
                        provider: provider.name.clone(),
                        message,
                    });
                }
            }
        }

        (self.catalog.clone(), errors)
    }

    async fn start_one(
        &self,
        provider: &ProviderConfig,
    ) -> Result<(Arc<dyn Session>, Vec<ToolDefinition>), String> {
        debug!(provider = %provider.name, transport = provider.transport.kind(), "Starting provider");
        let session = transport::open(provider, &self.handlers, &self.http)
            .await
            .map_err(|e| e.to_string())?;

        let discovered = async {
            let caps = session
                .initialize(&self.config.protocol_version, &self.config.client_info)
                .await?;
            if !is_supported_protocol_version(&caps.protocol_version) {
                return Err(TransportError::IncompatibleVersion(caps.protocol_version));
            }
            session.list_tools().await
        }
        .await;

        match discovered {
            Ok(tools) => Ok((session, tools)),
            Err(e) => {
                let mut message = e.to_string();
                if !matches!(e, TransportError::ConnectionClosed { stderr: Some(_) }) {
                    if let Some(stderr) = session.diagnostics() {
                        message.push_str("; stderr:\n");
                        message.push_str(&stderr);
                    }
                }
                session.close().await;
                Err(message)
            }
        }
    }

    /// Adopt a started session and its tools.
    fn register(&mut self, provider: &str, session: Arc<dyn Session>, tools: Vec<ToolDefinition>) {
        for tool in tools {
            if let Some(existing) = self.tools.get(&tool.name) {
                warn!(
                    tool = %tool.name,
                    provider,
                    kept = %existing.descriptor.provider_name,
                    "Dropping duplicate tool name"
                );
                continue;
            }
            let validator = match jsonschema::Validator::new(&tool.input_schema) {
                Ok(validator) => validator,
                Err(e) => {
                    warn!(tool = %tool.name, provider, error = %e, "Dropping tool with invalid input schema");
                    continue;
                }
            };
            let descriptor = ToolDescriptor {
                provider_name: provider.to_string(),
                tool_name: tool.name.clone(),
                description: tool.description,
                input_schema: tool.input_schema,
            };
            self.catalog.push(descriptor.clone());
            self.tools.insert(
                tool.name,
                RegisteredTool {
                    descriptor,
                    validator,
                    session: Arc::clone(&session),
                },
            );
        }
        self.lock_sessions().push((provider.to_string(), session));
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Close every session. Later calls do nothing.
    pub async fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.lock_sessions());
        if sessions.is_empty() {
            return;
        }
        let count = sessions.len();
        join_all(sessions.iter().map(|(name, session)| async move {
            session.close().await;
            debug!(provider = %name, "Provider session closed");
        }))
        .await;
        info!(count, "Provider pool shut down");
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, Vec<(String, Arc<dyn Session>)>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ToolExecutor for ProviderPool {
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let Some(tool) = self.tools.get(&call.tool_name) else {
            return ToolResult::error(
                call,
                ToolErrorKind::NotFound,
                format!("Tool not found: {}", call.tool_name),
            );
        };

        let arguments = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };
        if !tool.validator.is_valid(&arguments) {
            let errors: Vec<String> = tool
                .validator
                .iter_errors(&arguments)
                .map(|e| e.to_string())
                .collect();
            return ToolResult::error(
                call,
                ToolErrorKind::InvalidArguments,
                format!("Invalid arguments: {}", errors.join("; ")),
            );
        }

        let provider = &tool.descriptor.provider_name;
        debug!(provider = %provider, tool = %call.tool_name, call_id = %call.call_id, "Calling tool");
        let timeout = self.config.tool_call_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(provider = %provider, call_id = %call.call_id, "Tool call cancelled");
                ToolResult::error(call, ToolErrorKind::Cancelled, "Run cancelled while the tool was running")
            }
            outcome = tokio::time::timeout(timeout, tool.session.call(&call.tool_name, arguments)) => {
                match outcome {
                    Err(_) => {
                        let err = TransportError::Timeout(timeout);
                        warn!(provider = %provider, call_id = %call.call_id, error = %err, "Tool call timed out");
                        ToolResult::error(call, ToolErrorKind::Timeout, err.to_string())
                    }
                    Ok(Err(e)) => {
                        warn!(provider = %provider, call_id = %call.call_id, error = %e, "Tool call failed");
                        ToolResult::error(call, ToolErrorKind::ProviderFailed, e.to_string())
                    }
                    Ok(Ok(output)) if output.is_error => {
                        let mut result =
                            ToolResult::error(call, ToolErrorKind::ToolError, content_text(&output.content));
                        result.content = output.content;
                        result
                    }
                    Ok(Ok(output)) => ToolResult::success(call, output.content),
                }
            }
        }
    }
}
