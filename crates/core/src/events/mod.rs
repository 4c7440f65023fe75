//! Event system for run observers
//!
//! The executor publishes task and run events through an [`EventEmitter`]
//! that the caller owns and passes in. Subscribers are async and notified in
//! parallel; a broadcast receiver is available for callers that prefer
//! polling.

pub mod emitter;
pub mod subscriber;
pub mod types;

pub use emitter::EventEmitter;
pub use subscriber::{EnhancedEvent, EventSubscriber};
pub use types::{RunEvent, SystemEvent, TaskEvent};
