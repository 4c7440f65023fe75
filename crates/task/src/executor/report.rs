use super::state::TaskStatus;
use crate::definition::TaskKey;
use crate::resolver::{OutputStore, Outputs};
use chrono::{DateTime, Utc};
use kforge_core::{Error, Result, TargetKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Terminal outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every task is done; warnings allowed
    Succeeded,
    /// At least one task failed or is blocked
    Failed,
    /// Cancelled before every task settled
    Aborted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct TaskFailure {
    pub task: TaskKey,
    pub error: Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskWarning {
    pub task: TaskKey,
    pub message: String,
}

/// Why a task never left `Pending`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum BlockReason {
    /// Link chain from the blocked task to the failed task it depends on
    FailedDependency { chain: Vec<TaskKey> },
    /// The task is on, or depends on, this cycle
    Cycle { path: Vec<TaskKey> },
    /// The run was cancelled first
    Cancelled,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |keys: &[TaskKey]| {
            keys.iter()
                .map(TaskKey::as_str)
                .collect::<Vec<_>>()
                .join(" -> ")
        };
        match self {
            BlockReason::FailedDependency { chain } => {
                write!(f, "blocked by failed dependency: {}", join(chain))
            }
            BlockReason::Cycle { path } => write!(f, "blocked by dependency cycle: {}", join(path)),
            BlockReason::Cancelled => f.write_str("run was cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    pub task: TaskKey,
    #[serde(flatten)]
    pub reason: BlockReason,
}

/// Everything a caller needs to know about a finished run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: TargetKind,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Waves as actually executed, secondary tasks included
    pub waves: Vec<Vec<TaskKey>>,
    pub statuses: BTreeMap<TaskKey, TaskStatus>,
    /// Tasks settled without rendering (`Ignore` lifecycle)
    pub skipped: Vec<TaskKey>,
    pub failures: Vec<TaskFailure>,
    pub blocked: Vec<BlockedTask>,
    pub warnings: Vec<TaskWarning>,
    /// Secondary tasks registered during the run, in registration order
    pub registered: Vec<TaskKey>,
    /// Error returned by the target's finish step, if it ran and failed
    pub finish_error: Option<Error>,
    pub(crate) outputs: Arc<OutputStore>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn status(&self, key: &TaskKey) -> Option<TaskStatus> {
        self.statuses.get(key).copied()
    }

    /// Frozen outputs of a done task
    pub fn outputs(&self, key: &TaskKey) -> Option<Arc<Outputs>> {
        self.outputs.get(key)
    }

    pub fn failure(&self, key: &TaskKey) -> Option<&Error> {
        self.failures
            .iter()
            .find(|failure| &failure.task == key)
            .map(|failure| &failure.error)
    }

    pub fn blocked_reason(&self, key: &TaskKey) -> Option<&BlockReason> {
        self.blocked
            .iter()
            .find(|blocked| &blocked.task == key)
            .map(|blocked| &blocked.reason)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    /// `Ok(self)` on success, otherwise an error naming failed and blocked tasks
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            RunOutcome::Succeeded => Ok(self),
            RunOutcome::Aborted => Err(Error::cancelled(format!("run {}", self.run_id))),
            RunOutcome::Failed => {
                if let (Some(error), true) = (self.finish_error, self.failures.is_empty()) {
                    return Err(error);
                }
                Err(Error::run_failed(
                    self.failures.iter().map(|f| f.task.to_string()).collect(),
                    self.blocked.iter().map(|b| b.task.to_string()).collect(),
                ))
            }
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} on {} {} in {:.2?}: {} done, {} failed, {} blocked, {} warning(s)",
            self.run_id,
            self.target,
            self.outcome,
            self.duration,
            self.count(TaskStatus::Done),
            self.failures.len(),
            self.blocked.len(),
            self.warnings.len()
        )?;
        for failure in &self.failures {
            writeln!(f, "  failed  {}: {}", failure.task, failure.error)?;
        }
        for blocked in &self.blocked {
            writeln!(f, "  blocked {}: {}", blocked.task, blocked.reason)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning {}: {}", warning.task, warning.message)?;
        }
        if let Some(error) = &self.finish_error {
            writeln!(f, "  finish: {error}")?;
        }
        Ok(())
    }
}
