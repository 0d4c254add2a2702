//! Allow-list enforcement between the model and the provider pool.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use skillrun_core::{ToolCall, ToolDescriptor, ToolErrorKind, ToolResult};

use crate::pool::ToolExecutor;

/// Routes tool calls of one run, failing closed on anything outside the
/// allowed set.
pub struct ToolRouter {
    allow_list: Vec<String>,
    tools: Vec<ToolDescriptor>,
    names: HashSet<String>,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolRouter {
    /// Filter `catalog` down to the tools named in `allow_list`.
    ///
    /// An empty allow-list allows every discovered tool.
    pub fn resolve(allow_list: &[String], catalog: &[ToolDescriptor]) -> Vec<ToolDescriptor> {
        if allow_list.is_empty() {
            return catalog.to_vec();
        }
        catalog
            .iter()
            .filter(|tool| allow_list.iter().any(|name| name == &tool.tool_name))
            .cloned()
            .collect()
    }

    pub fn new(
        allow_list: Vec<String>,
        catalog: &[ToolDescriptor],
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        let tools = Self::resolve(&allow_list, catalog);
        let names = tools.iter().map(|t| t.tool_name.clone()).collect();
        Self {
            allow_list,
            tools,
            names,
            executor,
        }
    }

    /// Tools the model is offered.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Execute `call` if it targets an allowed tool.
    pub async fn dispatch(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        if self.names.contains(&call.tool_name) {
            return self.executor.execute(call, cancel).await;
        }

        let listed = self.allow_list.is_empty() || self.allow_list.contains(&call.tool_name);
        if listed {
            debug!(tool = %call.tool_name, "Allowed tool was not discovered");
            ToolResult::error(
                call,
                ToolErrorKind::NotFound,
                format!("Tool not found: {}", call.tool_name),
            )
        } else {
            warn!(tool = %call.tool_name, "Rejected tool call outside the allow-list");
            ToolResult::error(
                call,
                ToolErrorKind::NotPermitted,
                format!("Tool not permitted: {}", call.tool_name),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolExecutor for CountingExecutor {
        async fn execute(&self, call: &ToolCall, _cancel: &CancellationToken) -> ToolResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ToolResult::success(call, json!([{"type": "text", "text": "ran"}]))
        }
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            provider_name: "p".into(),
            tool_name: name.into(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
        }
    }

    fn catalog() -> Vec<ToolDescriptor> {
        vec![tool("WebFetch"), tool("Write"), tool("Bash")]
    }

    #[test]
    fn empty_allow_list_allows_everything() {
        assert_eq!(ToolRouter::resolve(&[], &catalog()).len(), 3);
    }

    #[test]
    fn allow_list_filters_catalog() {
        let allowed = vec!["WebFetch".to_string(), "Write".to_string()];
        let names: Vec<String> = ToolRouter::resolve(&allowed, &catalog())
            .into_iter()
            .map(|t| t.tool_name)
            .collect();
        assert_eq!(names, vec!["WebFetch", "Write"]);
    }

    #[tokio::test]
    async fn disallowed_tool_never_reaches_a_provider() {
        let executor = Arc::new(CountingExecutor::default());
        let router = ToolRouter::new(
            vec!["WebFetch".into(), "Write".into()],
            &catalog(),
            executor.clone(),
        );
        let cancel = CancellationToken::new();

        let result = router
            .dispatch(&ToolCall::new("c1", "Bash", json!({"command": "rm -rf /"})), &cancel)
            .await;

        assert!(result.is_error);
        assert_eq!(result.error_kind, Some(ToolErrorKind::NotPermitted));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

        let allowed = router
            .dispatch(&ToolCall::new("c2", "WebFetch", json!({})), &cancel)
            .await;
        assert!(!allowed.is_error);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listed_but_undiscovered_tool_is_not_found() {
        let executor = Arc::new(CountingExecutor::default());
        let router = ToolRouter::new(vec!["Missing".into()], &catalog(), executor.clone());

        let result = router
            .dispatch(&ToolCall::new("c1", "Missing", json!({})), &CancellationToken::new())
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::NotFound));
        assert!(router.tools().is_empty());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }
}
