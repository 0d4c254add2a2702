//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use skillrun_core::TaskId;
use skillrun_engine::RunContext;
use skillrun_store::TaskStore;

/// Shared application state.
pub struct AppState {
    /// Everything a run needs.
    pub run_context: RunContext,

    /// In-flight runs indexed by TaskId.
    pub runs: RwLock<HashMap<TaskId, CancellationToken>>,

    /// Idle interval before an SSE keep-alive frame.
    pub keep_alive: Duration,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(run_context: RunContext, keep_alive: Duration) -> Arc<Self> {
        Arc::new(Self {
            run_context,
            runs: RwLock::new(HashMap::new()),
            keep_alive,
        })
    }

    pub fn store(&self) -> &TaskStore {
        &self.run_context.store
    }

    /// Register a run for `id`. Returns `None` if one is already in flight.
    pub async fn begin_run(&self, id: &TaskId) -> Option<CancellationToken> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(id) {
            return None;
        }
        let token = CancellationToken::new();
        runs.insert(id.clone(), token.clone());
        Some(token)
    }

    pub async fn end_run(&self, id: &TaskId) {
        self.runs.write().await.remove(id);
    }

    /// Signal cancellation. Returns false when no run is in flight.
    pub async fn cancel_run(&self, id: &TaskId) -> bool {
        match self.runs.read().await.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every in-flight run. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let runs = self.runs.read().await;
        for token in runs.values() {
            token.cancel();
        }
        runs.len()
    }

    /// Number of in-flight runs.
    pub async fn active_runs(&self) -> usize {
        self.runs.read().await.len()
    }
}
