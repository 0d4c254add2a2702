//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use skillrun_engine::EngineConfig;

/// SkillRun task server.
#[derive(Parser, Debug, Clone)]
#[command(name = "skillrun-server", about = "SkillRun task execution server")]
pub struct Args {
    /// HTTP server address
    #[arg(long, default_value = "127.0.0.1:3001")]
    pub http_addr: String,

    /// Directory holding task records
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// JSON catalog of agents, skills and tool providers
    #[arg(long, conflicts_with = "catalog_url")]
    pub catalog: Option<PathBuf>,

    /// Base URL of the content backend
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// Project-level tool provider definitions (`{"toolProviders": [...]}`)
    #[arg(long)]
    pub project_config: Option<PathBuf>,

    /// Model session executable
    #[arg(long, default_value = "claude")]
    pub claude_path: String,

    /// Bound on starting one tool provider, in seconds
    #[arg(long, default_value = "30")]
    pub provider_start_timeout_secs: u64,

    /// Bound on one tool call, in seconds
    #[arg(long, default_value = "120")]
    pub tool_call_timeout_secs: u64,

    /// Idle interval before a keep-alive frame, in seconds
    #[arg(long, default_value = "30")]
    pub keep_alive_secs: u64,
}

/// Where agents, skills and providers come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    File(PathBuf),
    Http(String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub http_addr: String,

    /// Task store root.
    pub data_dir: PathBuf,

    pub catalog: Option<CatalogSource>,

    pub project_config: Option<PathBuf>,

    /// Path to the model session executable.
    pub claude_path: String,

    /// Interval of SSE keep-alive frames.
    pub keep_alive: Duration,

    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:3001".to_string(),
            data_dir: PathBuf::from("data"),
            catalog: None,
            project_config: None,
            claude_path: "claude".to_string(),
            keep_alive: Duration::from_secs(30),
            engine: EngineConfig::default(),
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        let catalog = match (args.catalog, args.catalog_url) {
            (Some(path), _) => Some(CatalogSource::File(path)),
            (None, Some(url)) => Some(CatalogSource::Http(url)),
            (None, None) => None,
        };
        Self {
            http_addr: args.http_addr,
            data_dir: args.data_dir,
            catalog,
            project_config: args.project_config,
            claude_path: args.claude_path,
            keep_alive: Duration::from_secs(args.keep_alive_secs.max(1)),
            engine: EngineConfig {
                provider_start_timeout: Duration::from_secs(args.provider_start_timeout_secs),
                tool_call_timeout: Duration::from_secs(args.tool_call_timeout_secs),
                ..Default::default()
            },
        }
    }
}
