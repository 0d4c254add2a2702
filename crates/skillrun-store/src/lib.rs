//! Task persistence for SkillRun.
//!
//! Layout under the data directory:
//!
//! ```text
//! data/
//!   index.json               compact summaries of every task
//!   tasks/{id}/task.json     task record (without the log)
//!   tasks/{id}/events.jsonl  append-only execution log
//! ```
//!
//! [`TaskStore`] is the single writer of task status and execution logs.
//! Writes are serialized per task id; different tasks never wait on each
//! other except for the short index update.

mod error;
mod index;
mod jsonl;
mod store;

pub use error::StoreError;
pub use store::{TaskPatch, TaskStore};
