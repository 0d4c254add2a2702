//! Append-only JSONL execution logs and atomic file replacement.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use skillrun_core::ExecutionEvent;

use crate::StoreError;

/// Append events to a log, one JSON object per line, and sync.
pub(crate) async fn append(path: &Path, events: &[ExecutionEvent]) -> Result<(), StoreError> {
    if events.is_empty() {
        return Ok(());
    }

    let mut buf = String::new();
    for event in events {
        buf.push_str(&serde_json::to_string(event)?);
        buf.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buf.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

/// Read a log back in order.
///
/// A missing file is an empty log. Lines that do not parse (a torn final
/// write) are skipped with a warning.
pub(crate) async fn replay(path: &Path) -> Result<Vec<ExecutionEvent>, StoreError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut events = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExecutionEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping unreadable log line");
            }
        }
    }
    Ok(events)
}

/// Write `value` as JSON to `path` via a temp file and rename.
pub(crate) async fn write_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = tmp_path_for(path);

    let mut tmp = fs::File::create(&tmp_path).await?;
    tmp.write_all(&json).await?;
    tmp.sync_all().await?;
    drop(tmp);

    fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
