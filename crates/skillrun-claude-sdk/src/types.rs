//! Type definitions for stream-JSON messages exchanged with the model CLI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use skillrun_core::ToolDescriptor;

/// Top-level message from the model CLI stdout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeMessage {
    /// System initialization message.
    System {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },

    /// Assistant response message.
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// User message (echo).
    User {
        message: UserMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Execution result.
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default, alias = "isError")]
        is_error: Option<bool>,
        #[serde(default, alias = "durationMs")]
        duration_ms: Option<u64>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, alias = "totalCostUsd")]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        usage: Option<ResultUsage>,
        #[serde(default, alias = "sessionId")]
        session_id: Option<String>,
    },

    /// Unknown message type (fallback).
    #[serde(untagged)]
    Unknown(Value),
}

impl ClaudeMessage {
    /// Extract session ID from any message type.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System { session_id, .. } => session_id.as_deref(),
            Self::Assistant { session_id, .. } => session_id.as_deref(),
            Self::User { session_id, .. } => session_id.as_deref(),
            Self::Result { session_id, .. } => session_id.as_deref(),
            Self::Unknown(_) => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System { .. } => "System",
            Self::Assistant { .. } => "Assistant",
            Self::User { .. } => "User",
            Self::Result { .. } => "Result",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Token usage as reported in the result message.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ResultUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// Assistant message content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// User message content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// Content item in a message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Text content.
    Text { text: String },

    /// Thinking/reasoning content.
    Thinking { thinking: String },

    /// Tool use request.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// Tool result.
    ToolResult {
        tool_use_id: String,
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
}

/// Tool definition as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ToolSpec {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.tool_name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

/// Control request from SDK to CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SdkControlRequest {
    #[serde(rename = "type")]
    pub message_type: String,
    pub request_id: String,
    pub request: SdkControlRequestType,
}

impl SdkControlRequest {
    pub fn new(request: SdkControlRequestType) -> Self {
        Self {
            message_type: "control_request".to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
            request,
        }
    }
}

/// Types of SDK control requests.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SdkControlRequestType {
    /// Initialize the session with the external tool catalog.
    Initialize { tools: Vec<ToolSpec> },
}

/// Message written to the CLI stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMessage {
    User { message: UserMessage },
}

impl InputMessage {
    /// Plain user prompt.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::User {
            message: UserMessage {
                role: "user".to_string(),
                content: vec![ContentItem::Text { text: text.into() }],
            },
        }
    }

    /// Tool result fed back into the conversation.
    pub fn tool_result(tool_use_id: impl Into<String>, content: String, is_error: bool) -> Self {
        Self::User {
            message: UserMessage {
                role: "user".to_string(),
                content: vec![ContentItem::ToolResult {
                    tool_use_id: tool_use_id.into(),
                    content: Value::String(content),
                    is_error: Some(is_error),
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_parsing() {
        let json = r#"{"type":"system","subtype":"init","session_id":"abc123","model":"claude-sonnet-4"}"#;
        let msg: ClaudeMessage = serde_json::from_str(json).unwrap();

        assert!(matches!(msg, ClaudeMessage::System { .. }));
        assert_eq!(msg.session_id(), Some("abc123"));
    }

    #[test]
    fn test_assistant_message_with_tool_use() {
        let json = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Let me look"},{"type":"tool_use","id":"toolu_1","name":"WebFetch","input":{"url":"https://example.com"}}]},"session_id":"s"}"#;
        let msg: ClaudeMessage = serde_json::from_str(json).unwrap();

        if let ClaudeMessage::Assistant { message, .. } = msg {
            assert_eq!(message.content.len(), 2);
            match &message.content[1] {
                ContentItem::ToolUse { id, name, input } => {
                    assert_eq!(id, "toolu_1");
                    assert_eq!(name, "WebFetch");
                    assert_eq!(input["url"], "https://example.com");
                }
                other => panic!("Expected tool use, got {:?}", other),
            }
        } else {
            panic!("Expected assistant message");
        }
    }

    #[test]
    fn test_result_message_parsing() {
        let json = r#"{"type":"result","subtype":"success","is_error":false,"duration_ms":1234,"result":"done","total_cost_usd":0.02,"usage":{"input_tokens":100,"output_tokens":50},"session_id":"sess-abc"}"#;
        let msg: ClaudeMessage = serde_json::from_str(json).unwrap();

        if let ClaudeMessage::Result {
            is_error,
            duration_ms,
            total_cost_usd,
            usage,
            ..
        } = msg
        {
            assert_eq!(is_error, Some(false));
            assert_eq!(duration_ms, Some(1234));
            assert_eq!(total_cost_usd, Some(0.02));
            assert_eq!(usage.unwrap().output_tokens, 50);
        } else {
            panic!("Expected result message");
        }
    }

    #[test]
    fn test_unknown_message_falls_back() {
        let json = r#"{"type":"control_response","response":{}}"#;
        let msg: ClaudeMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClaudeMessage::Unknown(_)));
    }

    #[test]
    fn test_tool_result_input_serialization() {
        let msg = InputMessage::tool_result("toolu_1", "ok".to_string(), false);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "user");
        assert_eq!(json["message"]["content"][0]["type"], "tool_result");
        assert_eq!(json["message"]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_initialize_request_serialization() {
        let request = SdkControlRequest::new(SdkControlRequestType::Initialize { tools: vec![] });
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("control_request"));
        assert!(json.contains("initialize"));
    }
}
