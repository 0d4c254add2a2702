//! The model session interface.
//!
//! A [`ModelClient`] opens a conversation and hands back a [`ModelSession`]:
//! a bounded stream of [`SessionEvent`]s plus a channel for feeding tool
//! results back into the turn. The engine only ever sees this shape, never
//! a vendor SDK.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use skillrun_core::{PermissionMode, ToolCall, ToolDescriptor, ToolResult, Usage};

use crate::error::SdkError;

/// Default capacity of the event channel between a session and its consumer.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Everything needed to open a conversation.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub system_prompt: String,
    pub model: String,
    /// The user's task prompt.
    pub prompt: String,
    /// Tools the model may call.
    pub tools: Vec<ToolDescriptor>,
    pub permission_mode: PermissionMode,
}

/// Final outcome of a conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionResult {
    pub is_error: bool,
    pub error: Option<String>,
    /// Final answer text, if the model produced one.
    pub result: Option<String>,
    pub usage: Usage,
    /// Cost as reported by the model backend.
    pub total_cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub session_id: Option<String>,
}

/// Events yielded by a model session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Assistant text.
    Text(String),
    /// Assistant reasoning.
    Thinking(String),
    /// The model wants a tool run; answer with [`ModelSession::send_tool_result`].
    ToolUse(ToolCall),
    /// The conversation finished.
    Result(SessionResult),
    /// The session failed.
    Error(String),
}

/// Consumer side of an open conversation.
///
/// Dropping the session aborts it.
pub struct ModelSession {
    events: mpsc::Receiver<SessionEvent>,
    tool_results: mpsc::Sender<ToolResult>,
    abort: CancellationToken,
}

/// Producer side handed to a [`ModelClient`] implementation.
pub struct SessionDriver {
    pub events: mpsc::Sender<SessionEvent>,
    pub tool_results: mpsc::Receiver<ToolResult>,
    /// Cancelled when the consumer aborts or drops the session.
    pub abort: CancellationToken,
}

impl ModelSession {
    /// Create a connected session/driver pair.
    pub fn channel(capacity: usize) -> (ModelSession, SessionDriver) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (result_tx, result_rx) = mpsc::channel(capacity);
        let abort = CancellationToken::new();
        (
            ModelSession {
                events: event_rx,
                tool_results: result_tx,
                abort: abort.clone(),
            },
            SessionDriver {
                events: event_tx,
                tool_results: result_rx,
                abort,
            },
        )
    }

    /// Next event, or `None` once the driver has gone away.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Feed a resolved tool call back into the conversation.
    pub async fn send_tool_result(&self, result: ToolResult) -> Result<(), SdkError> {
        self.tool_results
            .send(result)
            .await
            .map_err(|_| SdkError::ChannelClosed)
    }

    /// Ask the driver to stop.
    pub fn abort(&self) {
        self.abort.cancel();
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        self.abort.cancel();
    }
}

/// Opens model conversations.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn start(&self, request: SessionRequest) -> Result<ModelSession, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_flow_to_consumer() {
        let (mut session, driver) = ModelSession::channel(4);
        driver
            .events
            .send(SessionEvent::Text("hello".into()))
            .await
            .unwrap();
        drop(driver);

        assert_eq!(session.next_event().await, Some(SessionEvent::Text("hello".into())));
        assert_eq!(session.next_event().await, None);
    }

    #[tokio::test]
    async fn test_tool_results_flow_to_driver() {
        let (session, mut driver) = ModelSession::channel(4);
        let call = ToolCall::new("c1", "echo", json!({}));
        session
            .send_tool_result(ToolResult::success(&call, json!("ok")))
            .await
            .unwrap();

        let received = driver.tool_results.recv().await.unwrap();
        assert_eq!(received.call_id, "c1");
    }

    #[tokio::test]
    async fn test_drop_aborts_driver() {
        let (session, driver) = ModelSession::channel(4);
        assert!(!driver.abort.is_cancelled());
        drop(session);
        assert!(driver.abort.is_cancelled());
    }

    #[tokio::test]
    async fn test_send_after_driver_gone_fails() {
        let (session, driver) = ModelSession::channel(4);
        drop(driver);
        let call = ToolCall::new("c1", "echo", json!({}));
        let err = session
            .send_tool_result(ToolResult::success(&call, json!("ok")))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::ChannelClosed));
    }
}
