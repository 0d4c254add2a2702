//! REST content backend client.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use skillrun_core::{Agent, ProviderConfig, Skill};

use super::DataAccess;
use crate::error::CatalogError;

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Content backend reached over HTTP.
///
/// Answers are wrapped as `{"data": ...}`; a 404 means the record does not
/// exist.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Base URL with `segments` appended, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CatalogError::Backend(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::Backend(format!("Base URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET the record under `segments`, returning `None` on 404.
    async fn fetch<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Option<T>, CatalogError> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, "Content backend request");
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Backend(format!("{} - {}", status, body)));
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(Some(envelope.data))
    }
}

#[async_trait]
impl DataAccess for HttpCatalog {
    async fn get_agent(&self, id: &str) -> Result<Agent, CatalogError> {
        self.fetch(&["agents", id], &[])
            .await?
            .ok_or_else(|| CatalogError::AgentNotFound(id.to_string()))
    }

    async fn get_skill(&self, id: &str) -> Result<Skill, CatalogError> {
        self.fetch(&["skills", id], &[])
            .await?
            .ok_or_else(|| CatalogError::SkillNotFound(id.to_string()))
    }

    async fn list_tool_providers(&self, ids: &[String]) -> Result<Vec<ProviderConfig>, CatalogError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let providers: Vec<ProviderConfig> = self
            .fetch(&["tool-providers"], &[("ids", ids.join(","))])
            .await?
            .unwrap_or_default();

        // The backend does not promise an order.
        let mut ordered = Vec::with_capacity(providers.len());
        for id in ids {
            if let Some(provider) = providers.iter().find(|p| &p.name == id) {
                ordered.push(provider.clone());
            }
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_enveloped_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "a1", "name": "Researcher", "model": "claude-sonnet-4"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/skills/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(format!("{}/api/", server.uri()), reqwest::Client::new());

        assert_eq!(catalog.get_agent("a1").await.unwrap().name, "Researcher");
        assert!(matches!(
            catalog.get_skill("missing").await,
            Err(CatalogError::SkillNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lists_providers_in_requested_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool-providers"))
            .and(query_param("ids", "b,a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"name": "a", "transport": {"kind": "in-process", "handle": "a"}},
                    {"name": "b", "transport": {"kind": "in-process", "handle": "b"}}
                ]
            })))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(server.uri(), reqwest::Client::new());
        let providers = catalog
            .list_tool_providers(&["b".to_string(), "a".to_string()])
            .await
            .unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        assert!(catalog.list_tool_providers(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ids_are_encoded_as_single_segments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/team%2Fa%201"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "team/a 1", "name": "Nested", "model": "claude-sonnet-4"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/skills/..%2Fadmin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(server.uri(), reqwest::Client::new());
        assert_eq!(catalog.get_agent("team/a 1").await.unwrap().name, "Nested");
        assert!(matches!(
            catalog.get_skill("../admin").await,
            Err(CatalogError::SkillNotFound(_))
        ));
    }

    #[tokio::test]
    async fn server_errors_surface_as_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(server.uri(), reqwest::Client::new());
        let err = catalog.get_agent("a1").await.unwrap_err();
        assert!(matches!(err, CatalogError::Backend(ref msg) if msg.contains("503")));
    }
}
