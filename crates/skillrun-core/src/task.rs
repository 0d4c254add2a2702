//! Task records and their compact summaries.

use crate::{ExecutionEvent, PermissionMode, TaskId, TaskStatus, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a task executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Run the agent with all of its skills reachable.
    #[default]
    Agent,
    /// Forced execution of one selected skill.
    Skill,
}

/// Which capability set a run was given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Isolation {
    /// True for forced (single skill) execution.
    pub forced: bool,
    /// Skills whose instructions were loaded, in selection order.
    pub skill_ids: Vec<String>,
    /// Providers in the merged configuration.
    pub providers: Vec<String>,
    /// Tool allow-list in effect; empty means every discovered tool.
    pub allowed_tools: Vec<String>,
    /// Whether skills outside the selection were reachable. Always false when forced.
    pub other_skills_reachable: bool,
}

/// Client-supplied fields for a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub name: String,
    pub agent_id: String,
    #[serde(default)]
    pub task_type: TaskType,
    /// Selected skill, required for `skill` tasks.
    #[serde(default)]
    pub skill_id: Option<String>,
    pub user_prompt: String,
    #[serde(default)]
    pub input_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
}

/// A Task is one run request and its full execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    pub name: String,
    pub agent_id: String,
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    pub user_prompt: String,

    /// Parameter map used for `{{key}}` templating.
    #[serde(default)]
    pub input_values: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,

    /// Current task status.
    pub status: TaskStatus,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub isolation: Option<Isolation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,

    /// Ordered, append-only run log.
    #[serde(default)]
    pub execution_log: Vec<ExecutionEvent>,
}

impl Task {
    /// Create a new pending Task.
    pub fn new(spec: NewTask) -> Self {
        Self {
            id: TaskId::generate(),
            name: spec.name,
            agent_id: spec.agent_id,
            task_type: spec.task_type,
            skill_id: spec.skill_id,
            user_prompt: spec.user_prompt,
            input_values: spec.input_values,
            permission_mode: spec.permission_mode,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            isolation: None,
            error_message: None,
            usage: None,
            cost_usd: None,
            execution_log: Vec::new(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Compact index entry for this task.
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            agent_id: self.agent_id.clone(),
            task_type: self.task_type,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
        }
    }
}

/// Index entry for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: TaskId,
    pub name: String,
    pub agent_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}
