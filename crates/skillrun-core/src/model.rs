//! Agent and skill definitions as served by the content backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission mode handed to the model session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Default mode - asks for permission.
    #[default]
    Default,
    /// Accept file edits automatically.
    AcceptEdits,
    /// Plan mode - requires approval to exit.
    Plan,
    /// Bypass all permissions (dangerous).
    BypassPermissions,
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AcceptEdits => write!(f, "acceptEdits"),
            Self::Plan => write!(f, "plan"),
            Self::BypassPermissions => write!(f, "bypassPermissions"),
        }
    }
}

/// A configured agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique agent id.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Base system prompt.
    #[serde(default)]
    pub system_prompt: String,

    /// Model identifier passed to the model session.
    pub model: String,

    /// Skills attached to this agent, in selection order.
    #[serde(default)]
    pub skill_ids: Vec<String>,

    /// Agent-tier tool providers.
    #[serde(default)]
    pub tool_provider_ids: Vec<String>,

    /// Tool allow-list for agent runs; empty allows every discovered tool.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Default permission mode when the task does not set one.
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
}

impl Agent {
    /// Create an agent with an empty prompt and no skills or providers.
    pub fn new(id: impl Into<String>, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: String::new(),
            model: model.into(),
            skill_ids: Vec::new(),
            tool_provider_ids: Vec::new(),
            allowed_tools: Vec::new(),
            permission_mode: None,
        }
    }
}

/// A reusable skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    /// Unique skill id.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// One-line description.
    #[serde(default)]
    pub description: String,

    /// Skill instructions; may contain `{{key}}` placeholders.
    #[serde(default)]
    pub body: String,

    /// Tools this skill may use when executed in forced mode.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Skill-tier tool providers.
    #[serde(default)]
    pub tool_provider_ids: Vec<String>,

    /// Content version.
    #[serde(default)]
    pub version: Option<String>,
}

impl Skill {
    /// Create a skill with the given body.
    pub fn new(id: impl Into<String>, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            body: body.into(),
            allowed_tools: Vec::new(),
            tool_provider_ids: Vec::new(),
            version: None,
        }
    }
}
