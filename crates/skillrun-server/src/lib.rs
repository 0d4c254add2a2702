//! SkillRun Server Library
//!
//! HTTP task API over the execution engine: task creation and inspection,
//! streamed execution and cancellation.

pub mod config;
pub mod http;
pub mod shutdown;
pub mod state;
pub mod transcoder;

pub use config::{Args, ServerConfig};
pub use http::create_router;
pub use state::AppState;
