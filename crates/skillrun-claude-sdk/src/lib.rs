//! Model sessions for SkillRun
//!
//! This crate defines the [`ModelClient`] seam the execution engine talks
//! to, and [`ClaudeExecutor`], an implementation that drives the Claude Code
//! CLI over stream-JSON with tool calls answered by the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use skillrun_claude_sdk::{ClaudeExecutor, ModelClient, SessionEvent, SessionRequest};
//! use skillrun_core::PermissionMode;
//!
//! async fn run_agent() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = ClaudeExecutor::new("claude");
//!     let mut session = executor
//!         .start(SessionRequest {
//!             system_prompt: String::new(),
//!             model: "claude-sonnet-4-20250514".into(),
//!             prompt: "What is 2 + 2?".into(),
//!             tools: vec![],
//!             permission_mode: PermissionMode::Default,
//!         })
//!         .await?;
//!
//!     while let Some(event) = session.next_event().await {
//!         if let SessionEvent::Result(result) = event {
//!             println!("Done: {:?}", result.result);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod protocol;
mod session;
mod types;

pub use error::SdkError;
pub use executor::ClaudeExecutor;
pub use protocol::{StderrTail, STDERR_TAIL_LINES};
pub use session::{
    ModelClient, ModelSession, SessionDriver, SessionEvent, SessionRequest, SessionResult,
    DEFAULT_EVENT_CAPACITY,
};
pub use types::{
    AssistantMessage, ClaudeMessage, ContentItem, InputMessage, ResultUsage, SdkControlRequest,
    SdkControlRequestType, ToolSpec, UserMessage,
};
