use super::task::{spawn_render, RenderJob, RenderOutcome};
use crate::definition::{Task, TaskKey};
use crate::executor::context::RenderContext;
use crate::executor::dependency::{DependencyAnalyzer, DependencyGraph};
use crate::executor::graph::{find_cycles, next_wave, plan_waves};
use crate::executor::report::{
    BlockReason, BlockedTask, RunOutcome, RunReport, TaskFailure, TaskWarning,
};
use crate::executor::state::TaskStatus;
use crate::executor::Executor;
use crate::link::ID_FIELD;
use crate::resolver::{LinkResolver, LinkValue, OutputStore, Outputs};
use crate::target::Target;
use crate::task_map::TaskMap;
use chrono::Utc;
use kforge_core::{Error, Lifecycle, Result, RunEvent, TaskEvent};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Mutable bookkeeping for one run; only the pipeline loop touches it
struct RunState {
    graph: DependencyGraph,
    statuses: BTreeMap<TaskKey, TaskStatus>,
    outputs: Arc<OutputStore>,
    waves: Vec<Vec<TaskKey>>,
    skipped: Vec<TaskKey>,
    failures: Vec<TaskFailure>,
    warnings: Vec<TaskWarning>,
    registered: Vec<TaskKey>,
}

impl RunState {
    fn status(&self, key: &TaskKey) -> Option<TaskStatus> {
        self.statuses.get(key).copied()
    }

    fn set(&mut self, key: &TaskKey, status: TaskStatus) {
        self.statuses.insert(key.clone(), status);
    }
}

impl Executor {
    /// Drive `tasks` to completion against `target`
    ///
    /// Structural problems (dangling or self links, cycles) are returned as
    /// `Err` before anything renders. Everything after that, including task
    /// failures and cancellation, is reported through the returned
    /// [`RunReport`]. The target's finish step only runs when every task is
    /// done.
    pub async fn run(
        &self,
        tasks: &mut TaskMap,
        target: Arc<dyn Target>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let graph = DependencyAnalyzer::analyze_strict(tasks)?;
        let plan = plan_waves(&graph)?;
        target.begin().await?;

        let run_id = Uuid::new_v4();
        let run_span =
            kforge_utils::run_span(&run_id.to_string(), target.kind().as_str(), tasks.len());

        tracing::info!(
            parent: &run_span,
            tasks = tasks.len(),
            planned_waves = plan.waves.len(),
            target = %target.kind(),
            "Starting run"
        );

        self.drive(run_id, graph, tasks, target, cancel)
            .instrument(run_span)
            .await
    }

    async fn drive(
        &self,
        run_id: Uuid,
        graph: DependencyGraph,
        tasks: &mut TaskMap,
        target: Arc<dyn Target>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        if let Some(events) = &self.events {
            events
                .set_correlation_context(BTreeMap::from([(
                    "correlation_id".to_string(),
                    run_id.to_string(),
                )]))
                .await;
        }
        self.emit(RunEvent::RunStarted {
            run_id: run_id.to_string(),
            target: target.kind().to_string(),
            total_tasks: tasks.len(),
        })
        .await;

        let mut state = RunState {
            statuses: graph
                .keys()
                .map(|key| (key.clone(), TaskStatus::Pending))
                .collect(),
            graph,
            outputs: Arc::new(OutputStore::new()),
            waves: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            registered: Vec::new(),
        };
        let resolver = LinkResolver::new(Arc::clone(&state.outputs), target.resolve_mode());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        loop {
            if cancel.is_cancelled() {
                tracing::warn!("Run cancelled, no further waves will be dispatched");
                break;
            }

            self.settle_unmanaged(tasks, &mut state).await;

            let wave = next_wave(&state.graph, &state.statuses);
            if wave.is_empty() {
                break;
            }

            let wave_index = state.waves.len();
            let wave_span = kforge_utils::wave_span(wave_index, wave.len());
            self.run_wave(
                wave_index,
                wave,
                tasks,
                &target,
                &resolver,
                &semaphore,
                &cancel,
                &mut state,
            )
            .instrument(wave_span)
            .await;
        }

        let pending: Vec<TaskKey> = state
            .statuses
            .iter()
            .filter(|(_, status)| **status == TaskStatus::Pending)
            .map(|(key, _)| key.clone())
            .collect();
        let blocked = blocked_tasks(&state, &pending, cancel.is_cancelled());
        for blocked_task in &blocked {
            tracing::warn!(task = %blocked_task.task, reason = %blocked_task.reason, "Task blocked");
            self.emit(TaskEvent::TaskBlocked {
                task: blocked_task.task.to_string(),
                reason: blocked_task.reason.to_string(),
            })
            .await;
        }

        let mut outcome = if !pending.is_empty() && cancel.is_cancelled() {
            RunOutcome::Aborted
        } else if !state.failures.is_empty() || !pending.is_empty() {
            RunOutcome::Failed
        } else {
            RunOutcome::Succeeded
        };

        let mut finish_error = None;
        if outcome == RunOutcome::Succeeded {
            if let Err(e) = target.finish(tasks).await {
                tracing::error!(error = %e, target = %target.kind(), "Target finish failed");
                finish_error = Some(e);
                outcome = RunOutcome::Failed;
            }
        } else {
            tracing::info!(outcome = %outcome, "Skipping target finish");
        }

        let duration = clock.elapsed();
        tracing::info!(
            outcome = %outcome,
            waves = state.waves.len(),
            failed = state.failures.len(),
            blocked = blocked.len(),
            warnings = state.warnings.len(),
            duration_ms = duration.as_millis() as u64,
            "Run finished"
        );
        self.emit(RunEvent::RunFinished {
            run_id: run_id.to_string(),
            outcome: outcome.to_string(),
            duration_ms: duration.as_millis() as u64,
        })
        .await;
        if let Some(events) = &self.events {
            events.clear_correlation_context().await;
        }

        Ok(RunReport {
            run_id,
            target: target.kind(),
            outcome,
            started_at,
            duration,
            waves: state.waves,
            statuses: state.statuses,
            skipped: state.skipped,
            failures: state.failures,
            blocked,
            warnings: state.warnings,
            registered: state.registered,
            finish_error,
            outputs: state.outputs,
        })
    }

    /// Mark pending `Ignore` tasks done without rendering
    ///
    /// Their only output is the pre-existing identity, if the task has one.
    async fn settle_unmanaged(&self, tasks: &TaskMap, state: &mut RunState) {
        let unmanaged: Vec<TaskKey> = state
            .statuses
            .iter()
            .filter(|(key, status)| {
                **status == TaskStatus::Pending
                    && tasks
                        .lifecycle(key)
                        .is_some_and(|lifecycle| !lifecycle.is_rendered())
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in unmanaged {
            let mut outputs = Outputs::new();
            if let Some(id) = tasks.get(&key).and_then(|task| task.existing_identity()) {
                outputs.insert(ID_FIELD.to_string(), LinkValue::Concrete(id));
            }
            state.outputs.freeze(key.clone(), outputs);
            state.set(&key, TaskStatus::Done);
            state.skipped.push(key.clone());

            tracing::info!(task = %key, "Skipping unmanaged task");
            self.emit(TaskEvent::TaskSkipped {
                task: key.to_string(),
                reason: format!("lifecycle {}", Lifecycle::Ignore),
            })
            .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_wave(
        &self,
        wave_index: usize,
        wave: Vec<TaskKey>,
        tasks: &mut TaskMap,
        target: &Arc<dyn Target>,
        resolver: &LinkResolver,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) {
        tracing::info!(wave = wave_index, tasks = ?wave, "Starting wave");
        self.emit(RunEvent::WaveStarted {
            wave: wave_index,
            tasks: wave.iter().map(TaskKey::to_string).collect(),
        })
        .await;

        let mut join_set = JoinSet::new();
        for key in &wave {
            let Some(task) = tasks.get(key).cloned() else {
                continue;
            };
            let lifecycle = tasks.lifecycle(key).unwrap_or_default();

            let mut ctx =
                RenderContext::new(key.clone(), lifecycle, resolver.clone(), cancel.clone());
            if let Some(id) = task.existing_identity() {
                ctx.set_id(id);
            }

            state.set(key, TaskStatus::Rendering);
            spawn_render(
                &mut join_set,
                RenderJob {
                    key: key.clone(),
                    task,
                    lifecycle,
                    wave: wave_index,
                    ctx,
                    target: Arc::clone(target),
                    semaphore: Arc::clone(semaphore),
                    timeout: self.task_timeout,
                    cancel: cancel.clone(),
                    events: self.events.clone(),
                },
            );
        }

        // Wait for the whole wave to settle, then apply results in key order
        let mut results = Vec::with_capacity(wave.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "Render task could not be joined"),
            }
        }
        results.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut grew = false;
        for (key, outcome) in results {
            let lifecycle = tasks.lifecycle(&key).unwrap_or_default();
            match outcome {
                RenderOutcome::NotStarted => {
                    tracing::debug!(task = %key, "Not started before cancellation");
                    state.set(&key, TaskStatus::Pending);
                }
                RenderOutcome::Rendered {
                    ctx,
                    duration,
                    result,
                } => {
                    let (outputs, registrations) = ctx.into_parts();
                    match result {
                        Ok(()) => {
                            grew |= self
                                .accept(&key, outputs, registrations, tasks, state)
                                .await;
                            if state.status(&key) == Some(TaskStatus::Done) {
                                tracing::info!(task = %key, duration_ms = duration.as_millis() as u64, "Task completed");
                                self.emit(TaskEvent::TaskCompleted {
                                    task: key.to_string(),
                                    duration_ms: duration.as_millis() as u64,
                                })
                                .await;
                            }
                        }
                        Err(e) if e.is_cancelled() && cancel.is_cancelled() => {
                            tracing::warn!(task = %key, "Render interrupted by cancellation");
                            state.set(&key, TaskStatus::Pending);
                        }
                        Err(e) if lifecycle.downgrades(&e) => {
                            let message = e.to_string();
                            tracing::warn!(task = %key, lifecycle = %lifecycle, warning = %message, "Render warning accepted");
                            state.warnings.push(TaskWarning {
                                task: key.clone(),
                                message: message.clone(),
                            });
                            self.emit(TaskEvent::TaskWarned {
                                task: key.to_string(),
                                message,
                            })
                            .await;
                            grew |= self
                                .accept(&key, outputs, registrations, tasks, state)
                                .await;
                        }
                        Err(e) => self.fail(&key, e, state).await,
                    }
                }
            }
        }

        // Anything still rendering lost its join handle
        for key in &wave {
            if state.status(key) == Some(TaskStatus::Rendering) {
                self.fail(key, Error::cloud(format!("render {key}"), "render task was aborted"), state)
                    .await;
            }
        }

        if grew {
            self.reanalyze(tasks, state).await;
        }

        let done = wave
            .iter()
            .filter(|key| state.status(key) == Some(TaskStatus::Done))
            .count();
        let failed = wave
            .iter()
            .filter(|key| state.status(key) == Some(TaskStatus::Failed))
            .count();
        tracing::info!(wave = wave_index, done, failed, "Wave settled");
        self.emit(RunEvent::WaveCompleted {
            wave: wave_index,
            done,
            failed,
        })
        .await;
        state.waves.push(wave);
    }

    /// Mark a rendered task done, inserting its secondary tasks
    ///
    /// A registration that collides with an existing key fails the producing
    /// task instead. Returns whether the task map grew.
    async fn accept(
        &self,
        key: &TaskKey,
        outputs: Outputs,
        registrations: Vec<Arc<dyn Task>>,
        tasks: &mut TaskMap,
        state: &mut RunState,
    ) -> bool {
        let mut seen = BTreeSet::new();
        for registration in &registrations {
            let new_key = registration.key();
            if tasks.contains(&new_key) || !seen.insert(new_key.clone()) {
                self.fail(key, Error::duplicate_task(new_key.as_str()), state)
                    .await;
                return false;
            }
        }

        let grew = !registrations.is_empty();
        for registration in registrations {
            match tasks.add_task(registration) {
                Ok(new_key) => {
                    tracing::info!(task = %new_key, registered_by = %key, "Registered secondary task");
                    state.set(&new_key, TaskStatus::Pending);
                    state.registered.push(new_key.clone());
                    self.emit(TaskEvent::TaskRegistered {
                        task: new_key.to_string(),
                        registered_by: key.to_string(),
                    })
                    .await;
                }
                Err(e) => {
                    self.fail(key, e, state).await;
                    return grew;
                }
            }
        }

        state.outputs.freeze(key.clone(), outputs);
        state.set(key, TaskStatus::Done);
        grew
    }

    async fn fail(&self, key: &TaskKey, error: Error, state: &mut RunState) {
        tracing::error!(task = %key, error = %error, "Task failed");
        self.emit(TaskEvent::TaskFailed {
            task: key.to_string(),
            error: error.to_string(),
        })
        .await;
        state.set(key, TaskStatus::Failed);
        state.failures.push(TaskFailure {
            task: key.clone(),
            error,
        });
    }

    /// Rebuild the dependency graph after secondary tasks were inserted
    ///
    /// Pending tasks with invalid links fail; rendered tasks are left alone.
    async fn reanalyze(&self, tasks: &TaskMap, state: &mut RunState) {
        let analysis = DependencyAnalyzer::analyze(tasks);
        state.graph = analysis.graph;
        for (key, error) in analysis.errors {
            if state.status(&key) == Some(TaskStatus::Pending) {
                self.fail(&key, error, state).await;
            }
        }
        tracing::debug!(tasks = tasks.len(), "Dependency graph rebuilt");
    }
}

/// Explain every task left pending
fn blocked_tasks(state: &RunState, pending: &[TaskKey], cancelled: bool) -> Vec<BlockedTask> {
    let pending_set: BTreeSet<TaskKey> = pending.iter().cloned().collect();
    let cycles = find_cycles(&state.graph, &pending_set);
    let cycle_of = |key: &TaskKey| cycles.iter().find(|cycle| cycle.contains(key));

    pending
        .iter()
        .map(|key| {
            let reason = if let Some(chain) = chain_to(state, key, |dep| {
                state.status(dep) == Some(TaskStatus::Failed)
            }) {
                BlockReason::FailedDependency { chain }
            } else if let Some(cycle) = cycle_of(key) {
                BlockReason::Cycle {
                    path: cycle.clone(),
                }
            } else if let Some(cycle) = chain_to(state, key, |dep| cycle_of(dep).is_some())
                .and_then(|chain| chain.last().and_then(|last| cycle_of(last)))
            {
                BlockReason::Cycle {
                    path: cycle.clone(),
                }
            } else {
                debug_assert!(cancelled, "pending task {key} has no blocking cause");
                BlockReason::Cancelled
            };
            BlockedTask {
                task: key.clone(),
                reason,
            }
        })
        .collect()
}

/// Shortest dependency chain from `start` to a task matching `goal`,
/// following only dependencies that are not done
fn chain_to<F>(state: &RunState, start: &TaskKey, goal: F) -> Option<Vec<TaskKey>>
where
    F: Fn(&TaskKey) -> bool,
{
    let mut parent: BTreeMap<&TaskKey, &TaskKey> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for dep in state.graph.dependencies_of(current) {
            if dep == start
                || parent.contains_key(dep)
                || state.status(dep) == Some(TaskStatus::Done)
            {
                continue;
            }
            parent.insert(dep, current);
            if goal(dep) {
                let mut chain = vec![dep.clone()];
                let mut cursor = current;
                while cursor != start {
                    chain.push(cursor.clone());
                    cursor = *parent.get(cursor)?;
                }
                chain.push(start.clone());
                chain.reverse();
                return Some(chain);
            }
            queue.push_back(dep);
        }
    }
    None
}
