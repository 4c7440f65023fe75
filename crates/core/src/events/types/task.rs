//! Task render events

use serde::{Deserialize, Serialize};

/// Task render events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskEvent {
    /// A task's render has been dispatched
    TaskStarted { task: String, wave: usize },
    /// A task rendered successfully
    TaskCompleted { task: String, duration_ms: u64 },
    /// A warn-lifecycle task hit drift or an access failure and was accepted
    TaskWarned { task: String, message: String },
    /// A task's render failed
    TaskFailed { task: String, error: String },
    /// A task was treated as done without rendering
    TaskSkipped { task: String, reason: String },
    /// A task could not be rendered because of a failed or cyclic dependency
    TaskBlocked { task: String, reason: String },
    /// A render registered a new task into the running task map
    TaskRegistered { task: String, registered_by: String },
}

impl TaskEvent {
    /// The key of the task this event concerns
    pub fn task(&self) -> &str {
        match self {
            TaskEvent::TaskStarted { task, .. }
            | TaskEvent::TaskCompleted { task, .. }
            | TaskEvent::TaskWarned { task, .. }
            | TaskEvent::TaskFailed { task, .. }
            | TaskEvent::TaskSkipped { task, .. }
            | TaskEvent::TaskBlocked { task, .. }
            | TaskEvent::TaskRegistered { task, .. } => task,
        }
    }
}
