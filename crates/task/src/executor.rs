mod context;
mod dependency;
mod execution;
mod graph;
mod plan;
mod report;
mod state;

pub use context::RenderContext;
pub use dependency::{Analysis, DependencyAnalyzer, DependencyGraph};
pub use graph::{find_cycles, next_wave, plan_waves};
pub use plan::ExecutionPlan;
pub use report::{BlockReason, BlockedTask, RunOutcome, RunReport, TaskFailure, TaskWarning};
pub use state::TaskStatus;

use crate::task_map::TaskMap;
use kforge_config::{EngineConfig, DEFAULT_MAX_CONCURRENCY};
use kforge_core::{EventEmitter, Result, SystemEvent};
use std::sync::Arc;
use std::time::Duration;

/// Wave-based task executor
///
/// Holds only run-independent settings; every call to
/// [`run`](Executor::run) gets its own state, so one executor can drive many
/// task maps.
#[derive(Clone)]
pub struct Executor {
    pub(crate) max_concurrency: usize,
    pub(crate) task_timeout: Option<Duration>,
    pub(crate) events: Option<Arc<EventEmitter>>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            task_timeout: None,
            events: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new()
            .with_max_concurrency(config.max_concurrency)
            .with_task_timeout(config.task_timeout())
    }

    /// Limit renders in flight within one wave (at least 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Fail any single render that takes longer than `timeout`
    ///
    /// A zero timeout means no timeout.
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    /// Publish task and run events to `events`
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Validate links and layer the initial task map into waves
    pub fn plan(&self, tasks: &TaskMap) -> Result<ExecutionPlan> {
        let graph = DependencyAnalyzer::analyze_strict(tasks)?;
        plan_waves(&graph)
    }

    pub(crate) async fn emit(&self, event: impl Into<SystemEvent>) {
        if let Some(events) = &self.events {
            events.emit(event).await;
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("max_concurrency", &self.max_concurrency)
            .field("task_timeout", &self.task_timeout)
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kforge_core::TargetKind;

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            max_concurrency: 3,
            max_task_duration: Some(30),
            target: TargetKind::DryRun,
            ..EngineConfig::default()
        };
        let executor = Executor::from_config(&config);
        assert_eq!(executor.max_concurrency(), 3);
        assert_eq!(executor.task_timeout, Some(Duration::from_secs(30)));
        assert_eq!(Executor::new().with_max_concurrency(0).max_concurrency(), 1);
    }

    #[test]
    fn test_zero_task_timeout_disables_timeout() {
        let executor = Executor::new().with_task_timeout(Some(Duration::ZERO));
        assert_eq!(executor.task_timeout, None);

        let executor = Executor::new().with_task_timeout(Some(Duration::from_millis(1)));
        assert_eq!(executor.task_timeout, Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_plan_empty_map() {
        let plan = Executor::new().plan(&TaskMap::new()).unwrap();
        assert!(plan.is_empty());
    }
}
