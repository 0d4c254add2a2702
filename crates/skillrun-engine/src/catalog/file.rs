//! Catalog loaded from one JSON document.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use skillrun_core::{Agent, ProviderConfig, Skill};

use super::DataAccess;
use crate::error::CatalogError;

/// On-disk catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub tool_providers: Vec<ProviderConfig>,
}

/// In-memory catalog. Tool providers are addressed by name.
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    agents: HashMap<String, Agent>,
    skills: HashMap<String, Skill>,
    providers: HashMap<String, ProviderConfig>,
}

impl FileCatalog {
    pub fn new(document: CatalogDocument) -> Self {
        Self {
            agents: document
                .agents
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            skills: document
                .skills
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect(),
            providers: document
                .tool_providers
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    /// Load a catalog file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let document: CatalogDocument = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            agents = document.agents.len(),
            skills = document.skills.len(),
            providers = document.tool_providers.len(),
            "Catalog loaded"
        );
        Ok(Self::new(document))
    }
}

#[async_trait]
impl DataAccess for FileCatalog {
    async fn get_agent(&self, id: &str) -> Result<Agent, CatalogError> {
        self.agents
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::AgentNotFound(id.to_string()))
    }

    async fn get_skill(&self, id: &str) -> Result<Skill, CatalogError> {
        self.skills
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::SkillNotFound(id.to_string()))
    }

    async fn list_tool_providers(&self, ids: &[String]) -> Result<Vec<ProviderConfig>, CatalogError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match self.providers.get(id) {
                Some(provider) => found.push(provider.clone()),
                None => warn!(provider = %id, "Unknown tool provider id"),
            }
        }
        Ok(found)
    }
}
