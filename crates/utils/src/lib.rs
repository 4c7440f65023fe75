//! Shared utilities for kforge
//!
//! Logging setup and run-scoped span helpers live in [`tracing`], operator
//! interrupt handling in [`cancel`].

pub mod cancel;
pub mod tracing;

pub use self::cancel::*;
pub use self::tracing::*;
