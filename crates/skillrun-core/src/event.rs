//! Execution events for tracking a task run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskStatus, ToolCall, ToolResult};

/// One entry of a task's execution log.
///
/// `seq` is strictly increasing within a task, starting at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ExecutionEvent {
    /// Create an event stamped with the current time.
    pub fn new(seq: u64, kind: EventKind) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Wire name of the event type (`status`, `modelText`, ...).
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Returns true for the final `done` event.
    pub fn is_done(&self) -> bool {
        matches!(self.kind, EventKind::Done { .. })
    }
}

/// Phase reported by `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Resolving configuration and starting providers.
    Initializing,
    /// Providers are ready and the model conversation is open.
    Streaming,
    /// The run was cancelled.
    Cancelled,
}

/// Whether model text is an answer or reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    Text,
    Thinking,
}

/// Token usage reported by the model session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
}

/// Normalized event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    Status {
        status: PhaseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        details: Vec<String>,
    },

    ModelText {
        kind: TextKind,
        text: String,
    },

    ToolUse(ToolCall),

    ToolResult(ToolResult),

    #[serde(rename_all = "camelCase")]
    Completion {
        model: String,
        duration_ms: u64,
        usage: Usage,
        cost_usd: f64,
        /// True when the cost was computed from token counts.
        cost_estimated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    Done {
        status: TaskStatus,
    },
}

impl EventKind {
    /// Wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::ModelText { .. } => "modelText",
            Self::ToolUse(_) => "toolUse",
            Self::ToolResult(_) => "toolResult",
            Self::Completion { .. } => "completion",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    /// Status event without message.
    pub fn status(status: PhaseStatus) -> Self {
        Self::Status {
            status,
            message: None,
            details: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_event_wire_shape() {
        let event = ExecutionEvent::new(3, EventKind::status(PhaseStatus::Cancelled));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "cancelled");
        assert_eq!(value["seq"], 3);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_tool_use_flattens_call() {
        let call = ToolCall::new("c1", "WebFetch", json!({"url": "https://example.com"}));
        let event = ExecutionEvent::new(0, EventKind::ToolUse(call));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "toolUse");
        assert_eq!(value["callId"], "c1");
        assert_eq!(value["toolName"], "WebFetch");
        assert_eq!(event.type_name(), "toolUse");
    }

    #[test]
    fn test_round_trip_done() {
        let event = ExecutionEvent::new(9, EventKind::Done { status: TaskStatus::Completed });
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ExecutionEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, event);
        assert!(parsed.is_done());
    }

    #[test]
    fn test_completion_field_names() {
        let event = ExecutionEvent::new(
            1,
            EventKind::Completion {
                model: "claude-sonnet-4".into(),
                duration_ms: 1200,
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                    ..Default::default()
                },
                cost_usd: 0.01,
                cost_estimated: true,
                result: None,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["durationMs"], 1200);
        assert_eq!(value["usage"]["outputTokens"], 20);
        assert_eq!(value["costEstimated"], true);
    }
}
