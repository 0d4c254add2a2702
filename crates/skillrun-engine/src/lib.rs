//! SkillRun execution engine.
//!
//! A run flows through these pieces, leaves first:
//!
//! - [`ConfigResolver`] merges project, agent and skill provider definitions.
//! - [`transport`] opens a [`Session`] to one provider over one of four transports.
//! - [`ProviderPool`] starts every session of a run and executes tool calls.
//! - [`ToolRouter`] enforces the run's tool allow-list.
//! - [`ExecutionPipeline`] drives the model conversation and publishes the
//!   normalized event sequence, persisting it through the task store.

pub mod catalog;
pub mod config;
pub mod cost;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod prompt;
pub mod resolver;
pub mod router;
pub mod transport;

pub use catalog::{CatalogDocument, DataAccess, FileCatalog, HttpCatalog};
pub use config::EngineConfig;
pub use error::{CatalogError, ConfigError, ProviderError, RunError, TransportError};
pub use pipeline::{ExecutionPipeline, RunContext};
pub use plan::RunPlan;
pub use pool::{ProviderPool, ToolExecutor};
pub use resolver::ConfigResolver;
pub use router::ToolRouter;
pub use transport::{
    CallOutput, ClientInfo, HandlerRegistry, InProcessHandler, ServerCapabilities, Session,
    ToolDefinition,
};
