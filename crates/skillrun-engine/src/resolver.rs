//! Three-tier provider configuration resolution.
//!
//! Project, agent and skill definitions are merged by name with skill over
//! agent over project. A higher tier replaces the whole lower-tier entry;
//! fields are never merged.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use skillrun_core::{ConfigTier, ProviderConfig, TransportConfig};

use crate::error::ConfigError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern"));

/// Merges provider tiers and resolves `${VAR}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    env: HashMap<String, String>,
}

impl ConfigResolver {
    /// Create a resolver that substitutes placeholders from `env`.
    pub fn new(env: HashMap<String, String>) -> Self {
        Self { env }
    }

    /// Resolver over the current process environment.
    pub fn from_process_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    /// Merge the tiers into one provider set.
    ///
    /// `skills` holds one provider list per selected skill, in selection
    /// order. The result keeps the position at which each name was first
    /// seen; disabled entries are dropped after merging.
    pub fn resolve(
        &self,
        project: &[ProviderConfig],
        agent: &[ProviderConfig],
        skills: &[Vec<ProviderConfig>],
    ) -> Result<Vec<ProviderConfig>, ConfigError> {
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, ProviderConfig> = HashMap::new();

        let tiers = std::iter::once((ConfigTier::Project, project))
            .chain(std::iter::once((ConfigTier::Agent, agent)))
            .chain(skills.iter().map(|s| (ConfigTier::Skill, s.as_slice())));

        for (tier, providers) in tiers {
            for provider in providers {
                let mut entry = provider.clone();
                entry.tier = Some(tier);
                if let Some(previous) = merged.insert(entry.name.clone(), entry) {
                    debug!(
                        provider = %previous.name,
                        replaced_tier = ?previous.tier,
                        tier = %tier,
                        "Provider definition overridden"
                    );
                } else {
                    order.push(provider.name.clone());
                }
            }
        }

        let mut resolved = Vec::with_capacity(order.len());
        for name in order {
            let Some(mut provider) = merged.remove(&name) else {
                continue;
            };
            if !provider.enabled {
                debug!(provider = %name, "Skipping disabled provider");
                continue;
            }
            self.substitute(&mut provider)?;
            validate(&provider)?;
            provider.tier = None;
            resolved.push(provider);
        }
        Ok(resolved)
    }

    fn substitute(&self, provider: &mut ProviderConfig) -> Result<(), ConfigError> {
        let name = provider.name.clone();
        provider.transport.try_map_strings(|value| {
            let mut missing = None;
            let out = PLACEHOLDER.replace_all(value, |caps: &regex::Captures<'_>| {
                let var = &caps[1];
                match self.env.get(var) {
                    Some(v) => v.clone(),
                    None => {
                        missing.get_or_insert_with(|| var.to_string());
                        String::new()
                    }
                }
            });
            match missing {
                Some(variable) => Err(ConfigError::UnresolvedVariable {
                    provider: name.clone(),
                    variable,
                }),
                None => Ok(out.into_owned()),
            }
        })
    }
}

fn validate(provider: &ProviderConfig) -> Result<(), ConfigError> {
    let malformed = |reason: &str| ConfigError::Malformed {
        provider: provider.name.clone(),
        reason: reason.to_string(),
    };

    if provider.name.trim().is_empty() {
        return Err(malformed("empty name"));
    }
    match &provider.transport {
        TransportConfig::Process { command, .. } if command.trim().is_empty() => {
            Err(malformed("empty command"))
        }
        TransportConfig::StreamHttp { url, .. } | TransportConfig::PollHttp { url, .. }
            if !(url.starts_with("http://") || url.starts_with("https://")) =>
        {
            Err(malformed("url must be http(s)"))
        }
        TransportConfig::InProcess { handle } if handle.trim().is_empty() => {
            Err(malformed("empty handle"))
        }
        _ => Ok(()),
    }
}
