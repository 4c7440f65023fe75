use crate::definition::{Task, TaskKey};
use crate::executor::context::RenderContext;
use crate::target::Target;
use futures::FutureExt;
use kforge_core::{Error, EventEmitter, Lifecycle, Result, TaskEvent};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Everything one spawned render needs
pub(crate) struct RenderJob {
    pub key: TaskKey,
    pub task: Arc<dyn Task>,
    pub lifecycle: Lifecycle,
    pub wave: usize,
    pub ctx: RenderContext,
    pub target: Arc<dyn Target>,
    pub semaphore: Arc<Semaphore>,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
    pub events: Option<Arc<EventEmitter>>,
}

pub(crate) enum RenderOutcome {
    /// The render ran to completion, failed, timed out or was interrupted
    Rendered {
        ctx: RenderContext,
        duration: Duration,
        result: Result<()>,
    },
    /// Cancellation was observed before a worker slot freed up
    NotStarted,
}

/// Spawn a render onto the wave's join set
pub(crate) fn spawn_render(join_set: &mut JoinSet<(TaskKey, RenderOutcome)>, job: RenderJob) {
    let task_span = kforge_utils::task_span(job.key.as_str(), job.lifecycle.as_str());
    let key = job.key.clone();

    join_set.spawn(async move { (key, render_task(job).await) }.instrument(task_span));
}

async fn render_task(job: RenderJob) -> RenderOutcome {
    let RenderJob {
        key,
        task,
        lifecycle: _,
        wave,
        mut ctx,
        target,
        semaphore,
        timeout,
        cancel,
        events,
    } = job;

    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return RenderOutcome::NotStarted,
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return RenderOutcome::NotStarted,
        },
    };

    if let Some(events) = &events {
        events
            .emit(TaskEvent::TaskStarted {
                task: key.to_string(),
                wave,
            })
            .await;
    }
    tracing::debug!("Rendering task");

    let start_time = Instant::now();
    let result = {
        let render = AssertUnwindSafe(target.render(task.as_ref(), &mut ctx)).catch_unwind();
        let bounded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, render)
                    .await
                    .map_err(|_| Error::timeout(format!("render {key}"), limit)),
                None => Ok(render.await),
            }
        };

        tokio::select! {
            biased;
            outcome = bounded => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(panic_error(&key, panic)),
                Err(timeout) => Err(timeout),
            },
            _ = cancel.cancelled() => Err(Error::cancelled(format!("render {key}"))),
        }
    };

    RenderOutcome::Rendered {
        ctx,
        duration: start_time.elapsed(),
        result,
    }
}

fn panic_error(key: &TaskKey, panic: Box<dyn Any + Send>) -> Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Error::cloud(format!("render {key}"), format!("render panicked: {message}"))
}
