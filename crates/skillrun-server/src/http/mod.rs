//! HTTP server for the task API.
//!
//! Provides endpoints for:
//! - Task creation and listing (`/tasks`)
//! - Task inspection (`/tasks/{id}`)
//! - Streamed execution (`/tasks/{id}/execute`)
//! - Cancellation (`/tasks/{id}/cancel`)
//! - Health check (`/health`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod error;
mod handlers;

pub use error::ApiError;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/tasks",
            post(handlers::create_task).get(handlers::list_tasks),
        )
        .route("/tasks/:id", get(handlers::get_task))
        .route("/tasks/:id/execute", post(handlers::execute_task))
        .route("/tasks/:id/cancel", post(handlers::cancel_task))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
