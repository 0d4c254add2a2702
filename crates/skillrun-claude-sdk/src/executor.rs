//! Model sessions backed by the Claude Code CLI.
//!
//! Each session spawns one CLI process in stream-JSON mode. The external
//! tool catalog is announced with an `initialize` control request, the
//! prompt follows as a user message, and tool results are written back as
//! further user messages while the conversation runs.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::SdkError;
use crate::protocol::{read_loop, write_line, write_loop, StderrTail};
use crate::session::{
    ModelClient, ModelSession, SessionDriver, SessionEvent, SessionRequest,
    DEFAULT_EVENT_CAPACITY,
};
use crate::types::{InputMessage, SdkControlRequest, SdkControlRequestType, ToolSpec};

/// Tools the CLI ships with. Every run blocks all of them so that tool
/// calls can only reach the externally announced catalog.
pub const BUILTIN_TOOLS: &[&str] = &[
    "Bash",
    "BashOutput",
    "Edit",
    "Glob",
    "Grep",
    "KillShell",
    "LS",
    "MultiEdit",
    "NotebookEdit",
    "NotebookRead",
    "Read",
    "SlashCommand",
    "Task",
    "TodoWrite",
    "WebFetch",
    "WebSearch",
    "Write",
];

/// Executor for model sessions.
///
/// # Example
///
/// ```rust,no_run
/// use skillrun_claude_sdk::{ClaudeExecutor, ModelClient, SessionEvent, SessionRequest};
/// use skillrun_core::PermissionMode;
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let executor = ClaudeExecutor::new("claude");
///     let mut session = executor
///         .start(SessionRequest {
///             system_prompt: "You are terse.".into(),
///             model: "claude-sonnet-4-20250514".into(),
///             prompt: "What is 2 + 2?".into(),
///             tools: vec![],
///             permission_mode: PermissionMode::Default,
///         })
///         .await?;
///
///     while let Some(event) = session.next_event().await {
///         if let SessionEvent::Text(text) = event {
///             println!("{}", text);
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    /// Path to the CLI executable.
    claude_path: String,

    /// Maximum thinking tokens (optional).
    max_thinking_tokens: Option<u32>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,

    /// Capacity of the session event channel.
    event_capacity: usize,
}

impl ClaudeExecutor {
    /// Create a new executor with the given path to the CLI.
    ///
    /// The path can be just "claude" to use PATH lookup, or a full path.
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            max_thinking_tokens: None,
            env_vars: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set maximum thinking tokens.
    pub fn with_max_thinking_tokens(mut self, tokens: u32) -> Self {
        self.max_thinking_tokens = Some(tokens);
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set the capacity of the event channel.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    fn build_command(&self, request: &SessionRequest) -> Command {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print")
            .arg("--verbose")
            .arg("--input-format=stream-json")
            .arg("--output-format=stream-json")
            .arg("--model")
            .arg(&request.model)
            .arg("--permission-mode")
            .arg(request.permission_mode.to_string());

        if !request.system_prompt.is_empty() {
            cmd.arg("--system-prompt").arg(&request.system_prompt);
        }

        // External tools are pre-approved; the CLI's own tools never run.
        if !request.tools.is_empty() {
            let offered: Vec<&str> = request.tools.iter().map(|t| t.tool_name.as_str()).collect();
            cmd.arg("--allowedTools").arg(offered.join(","));
        }
        cmd.arg("--disallowedTools").arg(BUILTIN_TOOLS.join(","));

        if let Some(tokens) = self.max_thinking_tokens {
            cmd.arg("--max-thinking-tokens").arg(tokens.to_string());
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl ModelClient for ClaudeExecutor {
    async fn start(&self, request: SessionRequest) -> Result<ModelSession, SdkError> {
        info!(
            claude_path = %self.claude_path,
            model = %request.model,
            tools = request.tools.len(),
            prompt_len = request.prompt.len(),
            "Starting model session"
        );

        let mut cmd = self.build_command(&request);
        debug!("Full command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn model process");
            if e.kind() == std::io::ErrorKind::NotFound {
                SdkError::ClaudeNotFound(self.claude_path.clone())
            } else {
                SdkError::SpawnError(e)
            }
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stderr".to_string()))?;

        let tools: Vec<ToolSpec> = request.tools.iter().map(ToolSpec::from).collect();
        write_line(
            &mut stdin,
            &SdkControlRequest::new(SdkControlRequestType::Initialize { tools }),
        )
        .await?;
        write_line(&mut stdin, &InputMessage::prompt(&request.prompt)).await?;

        let stderr_tail = StderrTail::default();
        let tail = stderr_tail.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            warn!(stderr = %trimmed, "Model stderr");
                            tail.push(trimmed);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Error reading model stderr");
                        break;
                    }
                }
            }
        });

        let (session, driver) = ModelSession::channel(self.event_capacity);
        let SessionDriver {
            events,
            tool_results,
            abort,
        } = driver;

        tokio::spawn(async move {
            let writer = tokio::spawn(write_loop(stdin, tool_results));
            let reader = read_loop(BufReader::new(stdout), events.clone());

            tokio::select! {
                outcome = reader => {
                    match outcome {
                        Ok(true) => {}
                        Ok(false) => {
                            let status = child.wait().await;
                            let exit = match status {
                                Ok(s) => s.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
                                Err(e) => e.to_string(),
                            };
                            let mut message = format!("Model process exited without a result (exit: {})", exit);
                            if let Some(stderr) = stderr_tail.snapshot() {
                                message.push('\n');
                                message.push_str(&stderr);
                            }
                            let _ = events.send(SessionEvent::Error(message)).await;
                        }
                        Err(SdkError::ChannelClosed) => {
                            debug!("Session consumer went away");
                        }
                        Err(e) => {
                            let _ = events.send(SessionEvent::Error(e.to_string())).await;
                        }
                    }
                }
                _ = abort.cancelled() => {
                    info!("Model session aborted");
                }
            }

            writer.abort();
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Model process already gone");
            }
        });

        Ok(session)
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new("claude")
    }
}
