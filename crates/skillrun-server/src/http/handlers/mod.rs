//! HTTP request handlers.

mod health;
mod tasks;

pub use health::health_check;
pub use tasks::{cancel_task, create_task, execute_task, get_task, list_tasks};
