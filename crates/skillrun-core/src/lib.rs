//! SkillRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage
//! - Runtime specifics
//!
//! All types here represent the core business domain of SkillRun: agents,
//! skills, tool providers, tasks and the execution events a run produces.

pub mod event;
pub mod ids;
pub mod model;
pub mod provider;
pub mod status;
pub mod task;
pub mod tool;

// Re-export commonly used types
pub use event::{EventKind, ExecutionEvent, PhaseStatus, TextKind, Usage};
pub use ids::TaskId;
pub use model::{Agent, PermissionMode, Skill};
pub use provider::{ConfigTier, ProviderConfig, TransportConfig};
pub use status::TaskStatus;
pub use task::{Isolation, NewTask, Task, TaskSummary, TaskType};
pub use tool::{content_text, ToolCall, ToolDescriptor, ToolErrorKind, ToolResult};
