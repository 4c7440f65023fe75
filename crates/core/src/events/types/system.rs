//! Main system event enum

use super::{RunEvent, TaskEvent};
use serde::{Deserialize, Serialize};

/// Main event enum that encompasses all event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SystemEvent {
    Task(TaskEvent),
    Run(RunEvent),
}

impl From<TaskEvent> for SystemEvent {
    fn from(event: TaskEvent) -> Self {
        SystemEvent::Task(event)
    }
}

impl From<RunEvent> for SystemEvent {
    fn from(event: RunEvent) -> Self {
        SystemEvent::Run(event)
    }
}
