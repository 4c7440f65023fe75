//! Event type definitions

mod run;
mod system;
mod task;

pub use run::RunEvent;
pub use system::SystemEvent;
pub use task::TaskEvent;
