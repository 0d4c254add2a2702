//! Tool provider configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a provider definition came from.
///
/// Only used to decide precedence while merging; the order of the variants
/// is the precedence order (later wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigTier {
    Project,
    Agent,
    Skill,
}

impl fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Agent => write!(f, "agent"),
            Self::Skill => write!(f, "skill"),
        }
    }
}

/// How to reach a tool provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Spawn a local process and talk line-delimited JSON-RPC over stdio.
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },

    /// Persistent server-push connection plus plain HTTP requests.
    StreamHttp {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },

    /// Request/response HTTP only.
    PollHttp {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },

    /// A handler registered in this process under `handle`.
    InProcess { handle: String },
}

impl TransportConfig {
    /// Short name of the transport kind, as used in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Process { .. } => "process",
            Self::StreamHttp { .. } => "stream-http",
            Self::PollHttp { .. } => "poll-http",
            Self::InProcess { .. } => "in-process",
        }
    }

    /// Apply `f` to every string field that may contain `${VAR}` placeholders.
    pub fn try_map_strings<E>(
        &mut self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<(), E> {
        match self {
            Self::Process { command, args, env } => {
                *command = f(command)?;
                for arg in args.iter_mut() {
                    *arg = f(arg)?;
                }
                for value in env.values_mut() {
                    *value = f(value)?;
                }
            }
            Self::StreamHttp { url, headers } | Self::PollHttp { url, headers } => {
                *url = f(url)?;
                for value in headers.values_mut() {
                    *value = f(value)?;
                }
            }
            Self::InProcess { handle } => {
                *handle = f(handle)?;
            }
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

/// A single tool provider definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider name, unique within a merged set.
    pub name: String,

    /// Transport-specific connection details.
    pub transport: TransportConfig,

    /// Disabled providers are dropped after merging.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Tier the definition came from; set during merging only.
    #[serde(skip)]
    pub tier: Option<ConfigTier>,
}

impl ProviderConfig {
    /// Create an enabled provider definition.
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            enabled: true,
            tier: None,
        }
    }

    /// Builder method to disable the provider.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
