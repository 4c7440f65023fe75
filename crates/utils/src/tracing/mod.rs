use ::tracing::{span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use ::tracing::{debug, error, info, instrument, trace, warn};

/// Initialize the tracing system
///
/// Reads the filter from `RUST_LOG` and falls back to `info`. Output goes to
/// stderr so writer targets can stream their results on stdout.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Check if we're running in a TTY environment
fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Create a span for a whole engine run
pub fn run_span(run_id: &str, target: &str, total_tasks: usize) -> Span {
    span!(Level::INFO, "run", run_id = %run_id, target = %target, total_tasks = %total_tasks)
}

/// Create a span for one wave of independent tasks
pub fn wave_span(wave: usize, tasks: usize) -> Span {
    span!(Level::INFO, "wave", wave = %wave, tasks = %tasks)
}

/// Create a span for a single task render
pub fn task_span(task: &str, lifecycle: &str) -> Span {
    span!(Level::INFO, "task", task = %task, lifecycle = %lifecycle)
}
