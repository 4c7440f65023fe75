//! Whole-run and wave events

use serde::{Deserialize, Serialize};

/// Run execution events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunEvent {
    /// A run started against a target
    RunStarted {
        run_id: String,
        target: String,
        total_tasks: usize,
    },
    /// A wave of independent tasks started
    WaveStarted { wave: usize, tasks: Vec<String> },
    /// A wave settled
    WaveCompleted {
        wave: usize,
        done: usize,
        failed: usize,
    },
    /// A run finished
    RunFinished {
        run_id: String,
        outcome: String,
        duration_ms: u64,
    },
}
