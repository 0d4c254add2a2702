//! Access to agent, skill and tool provider definitions.

mod file;
mod http;

use async_trait::async_trait;

use skillrun_core::{Agent, ProviderConfig, Skill};

use crate::error::CatalogError;

pub use file::{CatalogDocument, FileCatalog};
pub use http::HttpCatalog;

/// Read-only view of the content backend.
#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn get_agent(&self, id: &str) -> Result<Agent, CatalogError>;

    async fn get_skill(&self, id: &str) -> Result<Skill, CatalogError>;

    /// Provider definitions for `ids`, in the order requested. Unknown ids
    /// are skipped.
    async fn list_tool_providers(&self, ids: &[String]) -> Result<Vec<ProviderConfig>, CatalogError>;
}
