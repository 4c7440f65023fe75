//! Configuration for the kforge engine
//!
//! This crate defines [`EngineConfig`] and loads it from TOML files and
//! `KFORGE_*` environment variables.

pub mod config;
pub mod loader;


pub use config::*;
pub use loader::*;
