//! Tool descriptors, calls and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A tool discovered on a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Provider that owns the tool.
    pub provider_name: String,
    /// Tool name, unique per provider.
    pub tool_name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the call arguments.
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Correlates this call with its result.
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Why a tool call produced an error result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No provider offers a tool with that name.
    NotFound,
    /// The tool exists but is outside the run's allow-list.
    NotPermitted,
    /// Arguments do not match the tool's input schema.
    InvalidArguments,
    /// The provider did not answer within the call timeout.
    Timeout,
    /// The provider failed (crashed, closed, protocol error).
    ProviderFailed,
    /// The tool ran and reported an error itself.
    ToolError,
    /// The run was cancelled while the call was in flight.
    Cancelled,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::NotPermitted => "not_permitted",
            Self::InvalidArguments => "invalid_arguments",
            Self::Timeout => "timeout",
            Self::ProviderFailed => "provider_failed",
            Self::ToolError => "tool_error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of a tool call, resolved exactly once per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub is_error: bool,
    /// Tool output (provider content blocks), `null` on error.
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    /// Successful result for `call`.
    pub fn success(call: &ToolCall, content: Value) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            is_error: false,
            content,
            error: None,
            error_kind: None,
        }
    }

    /// Error result for `call`.
    pub fn error(call: &ToolCall, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            is_error: true,
            content: Value::Null,
            error: Some(message.into()),
            error_kind: Some(kind),
        }
    }

    /// Text the model sees for this result.
    pub fn text_for_model(&self) -> String {
        if let Some(err) = &self.error {
            let kind = self
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "error".to_string());
            return format!("[{}] {}", kind, err);
        }
        content_text(&self.content)
    }
}

/// Flatten provider content blocks into plain text.
///
/// Text blocks are joined with newlines; any other block is rendered as JSON.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("text").and_then(Value::as_str) {
                Some(text) if item.get("type").and_then(Value::as_str) == Some("text") => {
                    text.to_string()
                }
                _ => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_result_shape() {
        let call = ToolCall::new("c1", "Bash", json!({"command": "ls"}));
        let result = ToolResult::error(&call, ToolErrorKind::NotPermitted, "tool not permitted: Bash");

        assert!(result.is_error);
        assert_eq!(result.call_id, "c1");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["errorKind"], "not_permitted");
        assert_eq!(value["isError"], true);
        assert_eq!(
            result.text_for_model(),
            "[not_permitted] tool not permitted: Bash"
        );
    }

    #[test]
    fn test_content_text_joins_blocks() {
        let content = json!([
            {"type": "text", "text": "line one"},
            {"type": "text", "text": "line two"}
        ]);
        assert_eq!(content_text(&content), "line one\nline two");
    }

    #[test]
    fn test_content_text_renders_non_text_blocks() {
        let content = json!([{"type": "image", "data": "abc"}]);
        assert!(content_text(&content).contains("\"image\""));
    }
}
