//! Core domain types, errors, and events for `kforge`.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all failure modes of the task-graph engine.
//! - **`lifecycle`**: The per-task `Lifecycle` marker deciding whether a
//!   resource is managed, observed, or left alone.
//! - **`events`**: Task and run events plus the `EventEmitter` used to observe
//!   a run.
//! - **`types`**: Small shared value types such as `TargetKind`.

pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod types;

pub use self::{
    errors::{Error, Result, ResultExt},
    events::{EventEmitter, RunEvent, SystemEvent, TaskEvent},
    lifecycle::Lifecycle,
    types::TargetKind,
};
