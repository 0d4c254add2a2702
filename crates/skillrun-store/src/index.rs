//! Compact task index backing listings.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};

use skillrun_core::{Task, TaskSummary};

use crate::jsonl::write_atomic;
use crate::StoreError;

/// Summaries of every task, in creation order, mirrored to `index.json`.
pub(crate) struct TaskIndex {
    path: PathBuf,
    entries: Mutex<Vec<TaskSummary>>,
}

impl TaskIndex {
    /// Load the index, rebuilding it from task records if the file is gone.
    pub(crate) async fn load(path: PathBuf, tasks_dir: &Path) -> Result<Self, StoreError> {
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<TaskSummary>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let entries = rebuild(tasks_dir).await?;
                if !entries.is_empty() {
                    info!(count = entries.len(), "Rebuilt task index from records");
                    write_atomic(&path, &entries).await?;
                }
                entries
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Insert or replace the entry for `summary.id` and persist.
    pub(crate) async fn upsert(&self, summary: TaskSummary) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|e| e.id == summary.id) {
            Some(existing) => *existing = summary,
            None => entries.push(summary),
        }
        write_atomic(&self.path, &*entries).await
    }

    /// Newest first page plus the total count.
    pub(crate) async fn page(&self, limit: usize, offset: usize) -> (Vec<TaskSummary>, usize) {
        let entries = self.entries.lock().await;
        let page = entries
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, entries.len())
    }

    pub(crate) async fn snapshot(&self) -> Vec<TaskSummary> {
        self.entries.lock().await.clone()
    }
}

async fn rebuild(tasks_dir: &Path) -> Result<Vec<TaskSummary>, StoreError> {
    let mut entries = Vec::new();
    let mut dir = match tokio::fs::read_dir(tasks_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = dir.next_entry().await? {
        let record = entry.path().join("task.json");
        let bytes = match tokio::fs::read(&record).await {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        match serde_json::from_slice::<Task>(&bytes) {
            Ok(task) => entries.push(task.summary()),
            Err(e) => warn!(path = %record.display(), error = %e, "Skipping unreadable task record"),
        }
    }

    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(entries)
}
