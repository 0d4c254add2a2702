//! The task store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use skillrun_core::{
    EventKind, ExecutionEvent, Isolation, NewTask, Task, TaskId, TaskStatus, TaskSummary, Usage,
};

use crate::index::TaskIndex;
use crate::jsonl;
use crate::StoreError;

const TASK_FILE: &str = "task.json";
const EVENTS_FILE: &str = "events.jsonl";

/// Fields applied together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// Appended to the execution log, in order.
    pub events: Vec<ExecutionEvent>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub usage: Option<Usage>,
    pub cost_usd: Option<f64>,
    pub isolation: Option<Isolation>,
}

impl TaskPatch {
    /// A patch that only appends events.
    pub fn events(events: Vec<ExecutionEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    fn apply(self, task: &mut Task) -> Vec<ExecutionEvent> {
        if let Some(started_at) = self.started_at {
            task.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = Some(completed_at);
        }
        if let Some(duration_ms) = self.duration_ms {
            task.duration_ms = Some(duration_ms);
        }
        if let Some(message) = self.error_message {
            task.error_message = Some(message);
        }
        if let Some(usage) = self.usage {
            task.usage = Some(usage);
        }
        if let Some(cost) = self.cost_usd {
            task.cost_usd = Some(cost);
        }
        if let Some(isolation) = self.isolation {
            task.isolation = Some(isolation);
        }
        self.events
    }
}

/// File-backed store of tasks and their execution logs.
pub struct TaskStore {
    tasks_dir: PathBuf,
    index: TaskIndex,
    locks: std::sync::Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl TaskStore {
    /// Open (or create) a store rooted at `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        let tasks_dir = data_dir.join("tasks");
        tokio::fs::create_dir_all(&tasks_dir).await?;

        let index = TaskIndex::load(data_dir.join("index.json"), &tasks_dir).await?;
        info!(data_dir = %data_dir.display(), "Task store opened");

        Ok(Self {
            tasks_dir,
            index,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Persist a new pending task.
    pub async fn create(&self, spec: NewTask) -> Result<Task, StoreError> {
        let task = Task::new(spec);
        let dir = self.task_dir(&task.id)?;
        tokio::fs::create_dir_all(&dir).await?;

        jsonl::write_atomic(&dir.join(TASK_FILE), &task).await?;
        tokio::fs::File::create(dir.join(EVENTS_FILE)).await?;
        self.index.upsert(task.summary()).await?;

        info!(task_id = %task.id, agent_id = %task.agent_id, "Task created");
        Ok(task)
    }

    /// Move a task to `status`, applying `patch` in the same write.
    ///
    /// Repeating the current non-terminal status is allowed and is how a
    /// running task appends to its log. Anything that is not forward
    /// progress fails with [`StoreError::InvalidTransition`].
    ///
    /// Returns the updated task without its execution log.
    pub async fn transition(
        &self,
        id: &TaskId,
        status: TaskStatus,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        let dir = self.task_dir(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut task = self.read_record(id, &dir).await?;
        if !task.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: task.status,
                to: status,
            });
        }

        let before = task.summary();
        let events = patch.apply(&mut task);
        task.status = status;

        jsonl::append(&dir.join(EVENTS_FILE), &events).await?;
        jsonl::write_atomic(&dir.join(TASK_FILE), &task).await?;

        let after = task.summary();
        if after != before {
            self.index.upsert(after).await?;
            debug!(task_id = %id, from = %before.status, to = %status, "Task transitioned");
        }
        if task.is_terminal() {
            self.forget_lock(id);
        }
        Ok(task)
    }

    /// Full task with its execution log.
    pub async fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
        let dir = self.task_dir(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut task = self.read_record(id, &dir).await?;
        task.execution_log = jsonl::replay(&dir.join(EVENTS_FILE)).await?;
        if task.is_terminal() {
            self.forget_lock(id);
        }
        Ok(task)
    }

    /// Page of summaries, newest first, and the total task count.
    pub async fn list(&self, limit: usize, offset: usize) -> (Vec<TaskSummary>, usize) {
        self.index.page(limit, offset).await
    }

    /// Fail tasks left `running` by a previous process.
    ///
    /// Their logs are closed with an `error` and a `done` event. Returns the
    /// number of tasks recovered.
    pub async fn fail_interrupted(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;
        for summary in self.index.snapshot().await {
            if summary.status != TaskStatus::Running {
                continue;
            }
            let task = self.get(&summary.id).await?;
            let next_seq = task.execution_log.last().map(|e| e.seq + 1).unwrap_or(0);
            let message = "Run interrupted by server restart".to_string();
            let now = Utc::now();

            let patch = TaskPatch {
                events: vec![
                    ExecutionEvent::new(
                        next_seq,
                        EventKind::Error {
                            message: message.clone(),
                            details: None,
                        },
                    ),
                    ExecutionEvent::new(
                        next_seq + 1,
                        EventKind::Done {
                            status: TaskStatus::Failed,
                        },
                    ),
                ],
                completed_at: Some(now),
                duration_ms: task
                    .started_at
                    .map(|s| (now - s).num_milliseconds().max(0) as u64),
                error_message: Some(message),
                ..Default::default()
            };
            match self.transition(&summary.id, TaskStatus::Failed, patch).await {
                Ok(_) => recovered += 1,
                Err(e) => warn!(task_id = %summary.id, error = %e, "Could not recover task"),
            }
        }
        if recovered > 0 {
            info!(count = recovered, "Marked interrupted tasks as failed");
        }
        Ok(recovered)
    }

    fn task_dir(&self, id: &TaskId) -> Result<PathBuf, StoreError> {
        if !id.is_path_safe() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.tasks_dir.join(id.as_str()))
    }

    fn lock_for(&self, id: &TaskId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    /// Drop the write lock of a finished task. Terminal records never change
    /// again, so a later caller is free to start a fresh lock.
    fn forget_lock(&self, id: &TaskId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(id);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn read_record(&self, id: &TaskId, dir: &Path) -> Result<Task, StoreError> {
        match tokio::fs::read(dir.join(TASK_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillrun_core::{PhaseStatus, TaskType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn new_task(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            agent_id: "agent-1".to_string(),
            task_type: TaskType::Agent,
            skill_id: None,
            user_prompt: "do it".to_string(),
            input_values: BTreeMap::from([("url".to_string(), json!("https://example.com"))]),
            permission_mode: None,
        }
    }

    fn status_event(seq: u64) -> ExecutionEvent {
        ExecutionEvent::new(seq, EventKind::status(PhaseStatus::Initializing))
    }

    #[tokio::test]
    async fn create_then_get() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();

        let task = store.create(new_task("one")).await.unwrap();
        let loaded = store.get(&task.id).await.unwrap();

        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.name, "one");
        assert_eq!(loaded.input_values["url"], json!("https://example.com"));
        assert!(loaded.execution_log.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();

        let err = store.get(&TaskId::new("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn unsafe_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();

        let err = store.get(&TaskId::new("../etc")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
    }

    #[tokio::test]
    async fn transition_appends_log_and_patch() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();
        let task = store.create(new_task("run")).await.unwrap();

        let started = Utc::now();
        store
            .transition(
                &task.id,
                TaskStatus::Running,
                TaskPatch {
                    events: vec![status_event(0)],
                    started_at: Some(started),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .transition(&task.id, TaskStatus::Running, TaskPatch::events(vec![status_event(1)]))
            .await
            .unwrap();
        store
            .transition(
                &task.id,
                TaskStatus::Completed,
                TaskPatch {
                    events: vec![ExecutionEvent::new(
                        2,
                        EventKind::Done {
                            status: TaskStatus::Completed,
                        },
                    )],
                    duration_ms: Some(42),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let loaded = store.get(&task.id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.started_at, Some(started));
        assert_eq!(loaded.duration_ms, Some(42));
        let seqs: Vec<u64> = loaded.execution_log.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(loaded.execution_log.last().unwrap().is_done());
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();
        let task = store.create(new_task("t")).await.unwrap();

        store
            .transition(&task.id, TaskStatus::Running, TaskPatch::default())
            .await
            .unwrap();
        store
            .transition(&task.id, TaskStatus::Completed, TaskPatch::default())
            .await
            .unwrap();

        for next in [
            TaskStatus::Running,
            TaskStatus::Pending,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::Completed,
        ] {
            let err = store
                .transition(&task.id, next, TaskPatch::events(vec![status_event(9)]))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidTransition { .. }));
        }

        // Rejected transitions leave the log untouched.
        assert!(store.get(&task.id).await.unwrap().execution_log.is_empty());
    }

    #[tokio::test]
    async fn finished_tasks_release_their_lock() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();
        let done = store.create(new_task("done")).await.unwrap();
        let open = store.create(new_task("open")).await.unwrap();

        store
            .transition(&done.id, TaskStatus::Running, TaskPatch::default())
            .await
            .unwrap();
        store
            .transition(&open.id, TaskStatus::Running, TaskPatch::default())
            .await
            .unwrap();
        assert_eq!(store.lock_count(), 2);

        store
            .transition(&done.id, TaskStatus::Completed, TaskPatch::default())
            .await
            .unwrap();
        assert_eq!(store.lock_count(), 1);

        store.get(&done.id).await.unwrap();
        assert_eq!(store.lock_count(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_with_total() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();
        for name in ["a", "b", "c"] {
            store.create(new_task(name)).await.unwrap();
        }

        let (page, total) = store.list(2, 0).await;
        assert_eq!(total, 3);
        let names: Vec<&str> = page.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);

        let (page, _) = store.list(2, 2).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "a");
    }

    #[tokio::test]
    async fn index_tracks_status_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = TaskStore::open(dir.path()).await.unwrap();
            let task = store.create(new_task("persist")).await.unwrap();
            store
                .transition(&task.id, TaskStatus::Running, TaskPatch::default())
                .await
                .unwrap();
            task.id
        };

        let store = TaskStore::open(dir.path()).await.unwrap();
        let (page, total) = store.list(10, 0).await;
        assert_eq!(total, 1);
        assert_eq!(page[0].id, id);
        assert_eq!(page[0].status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn missing_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        {
            let store = TaskStore::open(dir.path()).await.unwrap();
            store.create(new_task("x")).await.unwrap();
            store.create(new_task("y")).await.unwrap();
        }
        tokio::fs::remove_file(dir.path().join("index.json"))
            .await
            .unwrap();

        let store = TaskStore::open(dir.path()).await.unwrap();
        let (_, total) = store.list(10, 0).await;
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn interrupted_runs_are_failed_on_recovery() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).await.unwrap();
        let task = store.create(new_task("crashed")).await.unwrap();
        store
            .transition(
                &task.id,
                TaskStatus::Running,
                TaskPatch {
                    events: vec![status_event(0)],
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.fail_interrupted().await.unwrap(), 1);

        let loaded = store.get(&task.id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
        let types: Vec<&str> = loaded.execution_log.iter().map(|e| e.type_name()).collect();
        assert_eq!(types, vec!["status", "error", "done"]);
        assert_eq!(loaded.execution_log[2].seq, 2);
        assert_eq!(store.fail_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_task_are_serialized() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::open(dir.path()).await.unwrap());
        let task = store.create(new_task("busy")).await.unwrap();
        store
            .transition(&task.id, TaskStatus::Running, TaskPatch::default())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for seq in 0..20 {
            let store = Arc::clone(&store);
            let id = task.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transition(&id, TaskStatus::Running, TaskPatch::events(vec![status_event(seq)]))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(&task.id).await.unwrap().execution_log.len(), 20);
    }
}
