//! The streaming run pipeline.
//!
//! One [`ExecutionPipeline`] drives one task: it loads the run plan,
//! resolves and starts the task's providers, opens the model conversation
//! and republishes everything that happens as [`ExecutionEvent`]s. Each
//! event is persisted through the [`TaskStore`] before it is forwarded to
//! the stream consumer, so the log and the stream always agree.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use skillrun_claude_sdk::{ModelClient, SessionEvent, SessionRequest, SessionResult};
use skillrun_core::{
    EventKind, ExecutionEvent, PhaseStatus, ProviderConfig, Task, TaskId, TaskStatus, TextKind,
};
use skillrun_store::{TaskPatch, TaskStore};

use crate::catalog::DataAccess;
use crate::config::EngineConfig;
use crate::cost::estimate_cost;
use crate::error::RunError;
use crate::plan::RunPlan;
use crate::pool::ProviderPool;
use crate::resolver::ConfigResolver;
use crate::router::ToolRouter;
use crate::transport::HandlerRegistry;

/// Shared dependencies of every run.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<TaskStore>,
    pub data: Arc<dyn DataAccess>,
    pub model: Arc<dyn ModelClient>,
    pub resolver: Arc<ConfigResolver>,
    pub handlers: HandlerRegistry,
    pub http: reqwest::Client,
    pub config: EngineConfig,
    /// Project-tier provider definitions.
    pub project_providers: Arc<Vec<ProviderConfig>>,
}

/// How the streaming phase ended.
enum Outcome {
    Completed { model: String, result: SessionResult },
    Cancelled,
}

/// Drives a single task run.
pub struct ExecutionPipeline {
    ctx: RunContext,
    task: Task,
    cancel: CancellationToken,
    events: mpsc::Sender<ExecutionEvent>,
    next_seq: u64,
    started: Instant,
}

impl ExecutionPipeline {
    /// Create a pipeline for a pending `task` and the receiver of its events.
    pub fn new(
        ctx: RunContext,
        task: Task,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::channel(ctx.config.event_capacity.max(1));
        let next_seq = task.execution_log.last().map(|e| e.seq + 1).unwrap_or(0);
        let pipeline = Self {
            ctx,
            task,
            cancel,
            events: tx,
            next_seq,
            started: Instant::now(),
        };
        (pipeline, rx)
    }

    /// Run `task` on its own tokio task.
    ///
    /// The receiver yields every event of the run, ending with `done`.
    pub fn spawn(
        ctx: RunContext,
        task: Task,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<ExecutionEvent>, JoinHandle<TaskStatus>) {
        let (pipeline, rx) = Self::new(ctx, task, cancel);
        (rx, tokio::spawn(pipeline.run()))
    }

    fn id(&self) -> &TaskId {
        &self.task.id
    }

    /// Run to completion and return the terminal status.
    ///
    /// Exactly one `done` event is produced on every path, and the
    /// provider pool is shut down exactly once if it was started.
    pub async fn run(mut self) -> TaskStatus {
        self.started = Instant::now();
        info!(task_id = %self.id(), agent_id = %self.task.agent_id, "Run starting");

        let begin = TaskPatch {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self
            .record(
                TaskStatus::Running,
                vec![EventKind::Status {
                    status: PhaseStatus::Initializing,
                    message: Some("Resolving tool providers".to_string()),
                    details: Vec::new(),
                }],
                begin,
            )
            .await
        {
            // Not startable (already ran, or the store is unavailable).
            // Nothing is persisted; the consumer still gets a closed stream.
            warn!(task_id = %self.id(), error = %e, "Could not start run");
            let kinds = vec![
                EventKind::Error {
                    message: e.to_string(),
                    details: None,
                },
                EventKind::Done {
                    status: TaskStatus::Failed,
                },
            ];
            for kind in kinds {
                let event = self.next_event(kind);
                self.forward(event).await;
            }
            return TaskStatus::Failed;
        }

        let mut pool = None;
        let outcome = self.drive(&mut pool).await;
        if let Some(pool) = pool {
            pool.shutdown().await;
        }

        match outcome {
            Ok(Outcome::Completed { model, result }) => self.complete(model, result).await,
            Ok(Outcome::Cancelled) => self.cancelled().await,
            Err(e) => self.fail(e).await,
        }
    }

    async fn drive(&mut self, pool_slot: &mut Option<Arc<ProviderPool>>) -> Result<Outcome, RunError> {
        let plan = RunPlan::load(
            self.ctx.data.as_ref(),
            &self.task,
            &self.ctx.project_providers,
        )
        .await?;
        let providers = self.ctx.resolver.resolve(
            &plan.project_providers,
            &plan.agent_providers,
            &plan.skill_providers,
        )?;

        let mut pool = ProviderPool::new(
            self.ctx.config.clone(),
            self.ctx.handlers.clone(),
            self.ctx.http.clone(),
        );
        let started = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            started = pool.start(&providers) => Some(started),
        };
        let pool = Arc::new(pool);
        *pool_slot = Some(Arc::clone(&pool));
        let Some((catalog, provider_errors)) = started else {
            return Ok(Outcome::Cancelled);
        };

        let router = ToolRouter::new(plan.allow_list.clone(), &catalog, pool);
        let details: Vec<String> = provider_errors.iter().map(|e| e.to_string()).collect();
        self.record(
            TaskStatus::Running,
            vec![EventKind::Status {
                status: PhaseStatus::Streaming,
                message: Some(format!(
                    "{} tools available from {} providers",
                    router.tools().len(),
                    providers.len() - provider_errors.len()
                )),
                details,
            }],
            TaskPatch {
                isolation: Some(plan.isolation(&providers)),
                ..Default::default()
            },
        )
        .await?;

        let request = SessionRequest {
            system_prompt: plan.system_prompt.clone(),
            model: plan.model.clone(),
            prompt: self.task.user_prompt.clone(),
            tools: router.tools().to_vec(),
            permission_mode: plan.permission_mode,
        };
        let mut session = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Outcome::Cancelled),
            session = self.ctx.model.start(request) => session?,
        };
        debug!(task_id = %self.id(), model = %plan.model, "Model session open");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    session.abort();
                    return Ok(Outcome::Cancelled);
                }
                event = session.next_event() => event,
            };

            match event {
                Some(SessionEvent::Text(text)) => {
                    self.publish(EventKind::ModelText {
                        kind: TextKind::Text,
                        text,
                    })
                    .await?;
                }
                Some(SessionEvent::Thinking(text)) => {
                    self.publish(EventKind::ModelText {
                        kind: TextKind::Thinking,
                        text,
                    })
                    .await?;
                }
                Some(SessionEvent::ToolUse(call)) => {
                    self.publish(EventKind::ToolUse(call.clone())).await?;
                    let result = router.dispatch(&call, &self.cancel).await;
                    self.publish(EventKind::ToolResult(result.clone())).await?;
                    if self.cancel.is_cancelled() {
                        session.abort();
                        return Ok(Outcome::Cancelled);
                    }
                    session.send_tool_result(result).await?;
                }
                Some(SessionEvent::Result(result)) => {
                    if result.is_error {
                        return Err(RunError::Model(
                            result
                                .error
                                .unwrap_or_else(|| "Model reported an error result".to_string()),
                        ));
                    }
                    return Ok(Outcome::Completed {
                        model: plan.model,
                        result,
                    });
                }
                Some(SessionEvent::Error(message)) => return Err(RunError::Model(message)),
                None => {
                    return Err(RunError::Model(
                        "Model session ended without a result".to_string(),
                    ))
                }
            }
        }
    }

    async fn complete(mut self, model: String, result: SessionResult) -> TaskStatus {
        let duration_ms = self.elapsed_ms();
        let (cost_usd, cost_estimated) = match result.total_cost_usd {
            Some(cost) => (cost, false),
            None => (estimate_cost(&model, &result.usage), true),
        };
        info!(task_id = %self.id(), duration_ms, cost_usd, "Run completed");

        let patch = TaskPatch {
            completed_at: Some(Utc::now()),
            duration_ms: Some(duration_ms),
            usage: Some(result.usage),
            cost_usd: Some(cost_usd),
            ..Default::default()
        };
        let kinds = vec![
            EventKind::Completion {
                model,
                duration_ms: result.duration_ms.unwrap_or(duration_ms),
                usage: result.usage,
                cost_usd,
                cost_estimated,
                result: result.result,
            },
            EventKind::Done {
                status: TaskStatus::Completed,
            },
        ];
        self.finish(TaskStatus::Completed, kinds, patch).await
    }

    async fn cancelled(mut self) -> TaskStatus {
        info!(task_id = %self.id(), "Run cancelled");
        let patch = TaskPatch {
            completed_at: Some(Utc::now()),
            duration_ms: Some(self.elapsed_ms()),
            ..Default::default()
        };
        let kinds = vec![
            EventKind::Status {
                status: PhaseStatus::Cancelled,
                message: Some("Run cancelled".to_string()),
                details: Vec::new(),
            },
            EventKind::Done {
                status: TaskStatus::Cancelled,
            },
        ];
        self.finish(TaskStatus::Cancelled, kinds, patch).await
    }

    async fn fail(mut self, err: RunError) -> TaskStatus {
        let message = err.to_string();
        error!(task_id = %self.id(), error = %message, "Run failed");
        let patch = TaskPatch {
            completed_at: Some(Utc::now()),
            duration_ms: Some(self.elapsed_ms()),
            error_message: Some(message.clone()),
            ..Default::default()
        };
        let kinds = vec![
            EventKind::Error {
                message,
                details: None,
            },
            EventKind::Done {
                status: TaskStatus::Failed,
            },
        ];
        self.finish(TaskStatus::Failed, kinds, patch).await
    }

    async fn finish(&mut self, status: TaskStatus, kinds: Vec<EventKind>, patch: TaskPatch) -> TaskStatus {
        if let Err(e) = self.record(status, kinds, patch).await {
            error!(task_id = %self.id(), error = %e, "Failed to persist final events");
        }
        status
    }

    /// Append one event to a running task.
    async fn publish(&mut self, kind: EventKind) -> Result<(), RunError> {
        self.record(TaskStatus::Running, vec![kind], TaskPatch::default())
            .await
    }

    /// Persist `kinds` with a transition to `status`, then forward them.
    ///
    /// Events are forwarded even when the write fails so the stream still
    /// reaches its end; the write error is returned.
    async fn record(
        &mut self,
        status: TaskStatus,
        kinds: Vec<EventKind>,
        mut patch: TaskPatch,
    ) -> Result<(), RunError> {
        let events: Vec<ExecutionEvent> = kinds.into_iter().map(|k| self.next_event(k)).collect();
        patch.events = events.clone();
        let persisted = self.ctx.store.transition(self.id(), status, patch).await;
        if persisted.is_ok() || status.is_terminal() {
            for event in events {
                self.forward(event).await;
            }
        }
        persisted.map(|_| ()).map_err(RunError::from)
    }

    fn next_event(&mut self, kind: EventKind) -> ExecutionEvent {
        let event = ExecutionEvent::new(self.next_seq, kind);
        self.next_seq += 1;
        event
    }

    async fn forward(&self, event: ExecutionEvent) {
        if self.events.send(event).await.is_err() {
            debug!(task_id = %self.id(), "Event consumer gone");
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
