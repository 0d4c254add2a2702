//! Stream-JSON protocol handling for model CLI communication.
//!
//! Stdout carries one [`ClaudeMessage`] per line; stdin takes control
//! requests and user messages (the prompt, then tool results).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use skillrun_core::{ToolCall, ToolResult, Usage};

use crate::error::SdkError;
use crate::session::{SessionEvent, SessionResult};
use crate::types::{ClaudeMessage, ContentItem, InputMessage, ResultUsage};

/// Maximum number of stderr lines kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 50;

/// Bounded tail of a process's stderr.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StderrTail {
    pub fn push(&self, line: &str) {
        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Captured lines joined with newlines, `None` if nothing was captured.
    pub fn snapshot(&self) -> Option<String> {
        let lines = self.lines.lock().ok()?;
        if lines.is_empty() {
            None
        } else {
            Some(lines.iter().cloned().collect::<Vec<_>>().join("\n"))
        }
    }
}

/// Translate one CLI message into session events.
pub fn map_message(message: ClaudeMessage) -> Vec<SessionEvent> {
    match message {
        ClaudeMessage::Assistant { message, .. } => message
            .content
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(SessionEvent::Text(text)),
                ContentItem::Thinking { thinking } => Some(SessionEvent::Thinking(thinking)),
                ContentItem::ToolUse { id, name, input } => {
                    Some(SessionEvent::ToolUse(ToolCall::new(id, name, input)))
                }
                ContentItem::ToolResult { .. } => None,
            })
            .collect(),
        ClaudeMessage::Result {
            subtype,
            is_error,
            duration_ms,
            result,
            error,
            total_cost_usd,
            usage,
            session_id,
        } => {
            let is_error = is_error.unwrap_or(false);
            let error = if is_error {
                error.or_else(|| subtype.clone()).or_else(|| result.clone())
            } else {
                None
            };
            vec![SessionEvent::Result(SessionResult {
                is_error,
                error,
                result,
                usage: usage.map(convert_usage).unwrap_or_default(),
                total_cost_usd,
                duration_ms,
                session_id,
            })]
        }
        ClaudeMessage::System {
            session_id, model, ..
        } => {
            info!(session_id = ?session_id, model = ?model, "System message received");
            Vec::new()
        }
        ClaudeMessage::User { .. } => Vec::new(),
        ClaudeMessage::Unknown(value) => {
            if value.get("type").and_then(|t| t.as_str()) == Some("control_response") {
                debug!("Received control_response");
            } else {
                let preview: String = value.to_string().chars().take(200).collect();
                warn!(preview = %preview, "Received unexpected message type");
            }
            Vec::new()
        }
    }
}

fn convert_usage(usage: ResultUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_read_tokens: usage.cache_read_input_tokens,
        cache_creation_tokens: usage.cache_creation_input_tokens,
    }
}

/// Read stdout until EOF, forwarding events.
///
/// Returns true if a result message was seen.
pub async fn read_loop<R>(reader: R, events: mpsc::Sender<SessionEvent>) -> Result<bool, SdkError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut message_count = 0u64;
    let mut saw_result = false;

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        message_count += 1;
        trace!("Raw stdout: {}", trimmed);

        let message = match serde_json::from_str::<ClaudeMessage>(trimmed) {
            Ok(message) => message,
            Err(e) => {
                let preview: String = trimmed.chars().take(200).collect();
                warn!(error = %e, preview = %preview, "Failed to parse model message");
                continue;
            }
        };
        debug!(message_num = message_count, message_type = message.kind(), "Parsed model message");

        for event in map_message(message) {
            if matches!(event, SessionEvent::Result(_)) {
                saw_result = true;
            }
            if events.send(event).await.is_err() {
                return Err(SdkError::ChannelClosed);
            }
        }
        if saw_result {
            break;
        }
    }

    info!(total_messages = message_count, saw_result, "Model stdout loop finished");
    Ok(saw_result)
}

/// Serialize `message` as one line on `writer`.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), SdkError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let json = serde_json::to_string(message)?;
    trace!("Sending to stdin: {}", json);
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Forward tool results to stdin until the channel closes.
pub async fn write_loop<W>(
    mut writer: W,
    mut tool_results: mpsc::Receiver<ToolResult>,
) -> Result<(), SdkError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(result) = tool_results.recv().await {
        debug!(call_id = %result.call_id, is_error = result.is_error, "Sending tool result");
        let message =
            InputMessage::tool_result(&result.call_id, result.text_for_model(), result.is_error);
        write_line(&mut writer, &message).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[test]
    fn test_map_assistant_blocks() {
        let json = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"hi"},{"type":"tool_use","id":"t1","name":"Write","input":{"path":"a"}}]}}"#;
        let msg: ClaudeMessage = serde_json::from_str(json).unwrap();
        let events = map_message(msg);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SessionEvent::Thinking("hmm".into()));
        assert_eq!(events[1], SessionEvent::Text("hi".into()));
        assert_eq!(
            events[2],
            SessionEvent::ToolUse(ToolCall::new("t1", "Write", json!({"path": "a"})))
        );
    }

    #[test]
    fn test_map_error_result() {
        let json = r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#;
        let msg: ClaudeMessage = serde_json::from_str(json).unwrap();
        let events = map_message(msg);

        match &events[0] {
            SessionEvent::Result(result) => {
                assert!(result.is_error);
                assert_eq!(result.error.as_deref(), Some("error_max_turns"));
            }
            other => panic!("Expected result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_loop_stops_at_result() {
        let input = concat!(
            r#"{"type":"system","subtype":"init","session_id":"s"}"#,
            "\n",
            "not json\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"hi"}]}}"#,
            "\n",
            r#"{"type":"result","is_error":false,"usage":{"input_tokens":3,"output_tokens":4}}"#,
            "\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"late"}]}}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        let saw_result = read_loop(BufReader::new(input.as_bytes()), tx).await.unwrap();

        assert!(saw_result);
        assert_eq!(rx.recv().await, Some(SessionEvent::Text("hi".into())));
        match rx.recv().await {
            Some(SessionEvent::Result(result)) => {
                assert_eq!(result.usage.input_tokens, 3);
                assert_eq!(result.usage.output_tokens, 4);
            }
            other => panic!("Expected result, got {:?}", other),
        }
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_write_loop_emits_tool_result_lines() {
        let (tx, rx) = mpsc::channel(4);
        let call = ToolCall::new("t1", "echo", json!({}));
        tx.send(ToolResult::success(&call, json!("pong"))).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        write_loop(&mut out, rx).await.unwrap();
        let line = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();

        assert_eq!(value["message"]["content"][0]["tool_use_id"], "t1");
        assert_eq!(value["message"]["content"][0]["content"], "pong");
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let tail = StderrTail::default();
        assert!(tail.snapshot().is_none());
        for i in 0..(STDERR_TAIL_LINES + 5) {
            tail.push(&format!("line {}", i));
        }
        let snapshot = tail.snapshot().unwrap();
        assert!(!snapshot.contains("line 0\n"));
        assert!(snapshot.ends_with(&format!("line {}", STDERR_TAIL_LINES + 4)));
    }
}
