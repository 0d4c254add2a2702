//! SkillRun Server

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skillrun_claude_sdk::ClaudeExecutor;
use skillrun_core::ProviderConfig;
use skillrun_engine::{
    CatalogDocument, ConfigResolver, DataAccess, FileCatalog, HandlerRegistry, HttpCatalog,
    RunContext,
};
use skillrun_server::config::CatalogSource;
use skillrun_server::{create_router, shutdown, AppState, Args, ServerConfig};
use skillrun_store::TaskStore;

/// Runs get this long to wind down after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Project-tier provider file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectConfig {
    #[serde(default)]
    tool_providers: Vec<ProviderConfig>,
}

async fn load_project_providers(
    path: Option<&Path>,
) -> Result<Vec<ProviderConfig>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read project config '{}': {}", path.display(), e))?;
    let config: ProjectConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid project config '{}': {}", path.display(), e))?;
    info!(path = %path.display(), providers = config.tool_providers.len(), "Project providers loaded");
    Ok(config.tool_providers)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skillrun=info")),
        )
        .with_target(true)
        .init();

    let config = ServerConfig::from(Args::parse());
    let http_addr: SocketAddr = config.http_addr.parse()?;

    let store = Arc::new(TaskStore::open(&config.data_dir).await?);
    let recovered = store.fail_interrupted().await?;
    if recovered > 0 {
        warn!(count = recovered, "Recovered tasks interrupted by a previous shutdown");
    }

    let http = reqwest::Client::new();
    let data: Arc<dyn DataAccess> = match &config.catalog {
        Some(CatalogSource::File(path)) => Arc::new(FileCatalog::load(path).await?),
        Some(CatalogSource::Http(url)) => {
            info!(url = %url, "Using HTTP content backend");
            Arc::new(HttpCatalog::new(url.clone(), http.clone()))
        }
        None => {
            warn!("No catalog configured; every task will fail to find its agent");
            Arc::new(FileCatalog::new(CatalogDocument::default()))
        }
    };
    let project_providers = load_project_providers(config.project_config.as_deref()).await?;

    let run_context = RunContext {
        store,
        data,
        model: Arc::new(ClaudeExecutor::new(config.claude_path.clone())),
        resolver: Arc::new(ConfigResolver::from_process_env()),
        handlers: HandlerRegistry::new(),
        http,
        config: config.engine.clone(),
        project_providers: Arc::new(project_providers),
    };
    let state = AppState::new(run_context, config.keep_alive);

    let router = create_router(Arc::clone(&state));
    let listener = TcpListener::bind(http_addr).await?;
    info!(http_addr = %http_addr, data_dir = %config.data_dir.display(), "SkillRun server listening");

    let shutdown_token = shutdown::install_signal_handler();
    let drain_state = Arc::clone(&state);
    let drain_token = shutdown_token.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            drain_token.cancelled().await;
            shutdown::drain_runs(&drain_state, DRAIN_TIMEOUT).await;
        })
        .await?;

    info!("SkillRun server stopped");
    Ok(())
}
