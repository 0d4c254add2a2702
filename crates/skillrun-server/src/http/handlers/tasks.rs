//! Task handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use skillrun_core::{NewTask, PermissionMode, TaskId, TaskStatus, TaskSummary, TaskType};
use skillrun_engine::ExecutionPipeline;

use crate::http::ApiError;
use crate::state::AppState;
use crate::transcoder::{self, SseEventStream};

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 500;

/// Request body for POST /tasks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub input_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::MissingField { field }),
    }
}

impl CreateTaskRequest {
    fn validate(self) -> Result<NewTask, ApiError> {
        let name = required(self.name, "name")?;
        let agent_id = required(self.agent_id, "agentId")?;
        let task_type = self.task_type.ok_or(ApiError::MissingField { field: "taskType" })?;
        let user_prompt = required(self.user_prompt, "userPrompt")?;
        let skill_id = match task_type {
            TaskType::Skill => Some(required(self.skill_id, "skillId")?),
            TaskType::Agent => self.skill_id.filter(|s| !s.trim().is_empty()),
        };

        Ok(NewTask {
            name,
            agent_id,
            task_type,
            skill_id,
            user_prompt,
            input_values: self.input_values,
            permission_mode: self.permission_mode,
        })
    }
}

/// Query for GET /tasks.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Response for GET /tasks.
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// POST /tasks - Create a pending task.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    json_result: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = match json_result {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection, "Invalid JSON in request body");
            return Err(ApiError::InvalidJson {
                message: rejection.body_text(),
            });
        }
    };
    let spec = req.validate()?;

    // Referenced records must exist before the task does.
    let data = &state.run_context.data;
    data.get_agent(&spec.agent_id).await?;
    if let Some(skill_id) = &spec.skill_id {
        data.get_skill(skill_id).await?;
    }

    let task = state.store().create(spec).await?;
    info!(task_id = %task.id, task_type = ?task.task_type, "Task created via API");
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

/// GET /tasks - Page of task summaries, newest first.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<ListTasksResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    let offset = query.offset.unwrap_or(0);
    let (tasks, total) = state.store().list(limit, offset).await;
    Json(ListTasksResponse {
        tasks,
        total,
        limit,
        offset,
    })
}

/// GET /tasks/{id} - Task with its execution log.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state.store().get(&TaskId::new(id)).await?;
    Ok(Json(task).into_response())
}

/// POST /tasks/{id}/execute - Run a pending task, streaming its events.
pub async fn execute_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<SseEventStream>, ApiError> {
    let id = TaskId::new(id);
    let task = state.store().get(&id).await?;
    if task.status != TaskStatus::Pending {
        return Err(ApiError::Conflict {
            message: format!(
                "Task '{}' is {}; only pending tasks can be executed",
                id, task.status
            ),
        });
    }
    let Some(cancel) = state.begin_run(&id).await else {
        return Err(ApiError::Conflict {
            message: format!("Task '{}' is already running", id),
        });
    };

    let (events, handle) =
        ExecutionPipeline::spawn(state.run_context.clone(), task, cancel.clone());

    let watcher = Arc::clone(&state);
    let run_id = id.clone();
    tokio::spawn(async move {
        match handle.await {
            Ok(status) => info!(task_id = %run_id, status = %status, "Run finished"),
            Err(e) => error!(task_id = %run_id, error = %e, "Run task aborted"),
        }
        watcher.end_run(&run_id).await;
    });

    info!(task_id = %id, "Streaming task execution");
    Ok(transcoder::stream(events, cancel.drop_guard(), state.keep_alive))
}

/// POST /tasks/{id}/cancel - Signal an in-flight run to stop.
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = TaskId::new(id);
    if state.cancel_run(&id).await {
        info!(task_id = %id, "Cancellation requested");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "id": id, "status": "cancelling" })),
        )
            .into_response());
    }

    let task = state.store().get(&id).await?;
    Err(ApiError::Conflict {
        message: format!("Task '{}' is {}; only running tasks can be cancelled", id, task.status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::create_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use skillrun_claude_sdk::{
        ModelClient, ModelSession, SdkError, SessionEvent, SessionRequest, SessionResult,
    };
    use skillrun_core::{Agent, Skill, Task};
    use skillrun_engine::{
        CatalogDocument, ConfigResolver, EngineConfig, FileCatalog, HandlerRegistry, RunContext,
    };
    use skillrun_store::TaskStore;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Answers once, or waits for abort when `hang` is set.
    struct StubModel {
        hang: bool,
    }

    #[async_trait]
    impl ModelClient for StubModel {
        async fn start(&self, _request: SessionRequest) -> Result<ModelSession, SdkError> {
            let (session, driver) = ModelSession::channel(8);
            let hang = self.hang;
            tokio::spawn(async move {
                if hang {
                    driver.abort.cancelled().await;
                    return;
                }
                let _ = driver.events.send(SessionEvent::Text("hello".into())).await;
                let _ = driver
                    .events
                    .send(SessionEvent::Result(SessionResult {
                        total_cost_usd: Some(0.001),
                        ..Default::default()
                    }))
                    .await;
            });
            Ok(session)
        }
    }

    async fn app(hang: bool) -> (TempDir, Router, Arc<AppState>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::open(dir.path()).await.unwrap());

        let mut agent = Agent::new("a1", "Helper", "claude-sonnet-4");
        agent.skill_ids = vec!["s1".into()];
        let data = FileCatalog::new(CatalogDocument {
            agents: vec![agent],
            skills: vec![Skill::new("s1", "greet", "Say hi to {{who}}")],
            tool_providers: vec![],
        });

        let ctx = RunContext {
            store,
            data: Arc::new(data),
            model: Arc::new(StubModel { hang }),
            resolver: Arc::new(ConfigResolver::new(HashMap::new())),
            handlers: HandlerRegistry::new(),
            http: reqwest::Client::new(),
            config: EngineConfig::default(),
            project_providers: Arc::new(Vec::new()),
        };
        let state = AppState::new(ctx, Duration::from_secs(30));
        (dir, create_router(state.clone()), state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    async fn create(app: &Router) -> Task {
        let response = app
            .clone()
            .oneshot(post_json(
                "/tasks",
                json!({
                    "name": "greet",
                    "agentId": "a1",
                    "taskType": "skill",
                    "skillId": "s1",
                    "userPrompt": "go",
                    "inputValues": {"who": "world"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        serde_json::from_value(body_json(response).await).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_dir, app, _) = app(false).await;
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn create_get_and_list() {
        let (_dir, app, _) = app(false).await;
        let task = create(&app).await;
        assert_eq!(task.status, TaskStatus::Pending);

        let response = app
            .clone()
            .oneshot(get(&format!("/tasks/{}", task.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["inputValues"]["who"], "world");

        let response = app.oneshot(get("/tasks?limit=10")).await.unwrap();
        let listing = body_json(response).await;
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["tasks"][0]["id"], task.id.as_str());
    }

    #[tokio::test]
    async fn create_validates_input() {
        let (_dir, app, _) = app(false).await;

        let missing = app
            .clone()
            .oneshot(post_json("/tasks", json!({"agentId": "a1", "userPrompt": "go"})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(missing).await["error"]["param"], "name");

        let no_type = app
            .clone()
            .oneshot(post_json(
                "/tasks",
                json!({"name": "n", "agentId": "a1", "userPrompt": "go"}),
            ))
            .await
            .unwrap();
        assert_eq!(no_type.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(no_type).await["error"]["param"], "taskType");

        let no_skill = app
            .clone()
            .oneshot(post_json(
                "/tasks",
                json!({"name": "n", "agentId": "a1", "taskType": "skill", "userPrompt": "go"}),
            ))
            .await
            .unwrap();
        assert_eq!(no_skill.status(), StatusCode::BAD_REQUEST);

        let unknown_agent = app
            .clone()
            .oneshot(post_json(
                "/tasks",
                json!({"name": "n", "agentId": "ghost", "taskType": "agent", "userPrompt": "go"}),
            ))
            .await
            .unwrap();
        assert_eq!(unknown_agent.status(), StatusCode::NOT_FOUND);

        let bad_json = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let (_dir, app, _) = app(false).await;
        for request in [get("/tasks/nope"), post("/tasks/nope/execute"), post("/tasks/nope/cancel")] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn execute_streams_until_done_and_runs_once() {
        let (_dir, app, state) = app(false).await;
        let task = create(&app).await;

        let response = app
            .clone()
            .oneshot(post(&format!("/tasks/{}/execute", task.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let text = body_text(response).await;
        assert!(text.contains("event: status"));
        assert!(text.contains("event: modelText"));
        assert!(text.contains("event: completion"));
        assert_eq!(text.matches("event: done").count(), 1);

        let stored = state.store().get(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);

        let again = app
            .oneshot(post(&format!("/tasks/{}/execute", task.id)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cancel_stops_a_running_task() {
        let (_dir, app, state) = app(true).await;
        let task = create(&app).await;

        let pending = app
            .clone()
            .oneshot(post(&format!("/tasks/{}/cancel", task.id)))
            .await
            .unwrap();
        assert_eq!(pending.status(), StatusCode::CONFLICT);

        let stream = app
            .clone()
            .oneshot(post(&format!("/tasks/{}/execute", task.id)))
            .await
            .unwrap();

        let cancel = app
            .clone()
            .oneshot(post(&format!("/tasks/{}/cancel", task.id)))
            .await
            .unwrap();
        assert_eq!(cancel.status(), StatusCode::ACCEPTED);

        let text = body_text(stream).await;
        assert!(text.contains("\"status\":\"cancelled\""));
        assert!(text.trim_end().ends_with("\"status\":\"cancelled\"}"));

        let stored = state.store().get(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
    }
}
