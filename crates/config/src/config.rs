//! Engine configuration for kforge
//!
//! `EngineConfig` is immutable once a run starts. It is cheap to clone and is
//! read by the executor (concurrency, per-task timeout), by the task map
//! (lifecycle overrides) and by the writer targets (output directory,
//! Terraform provider settings).

use kforge_core::{Error, Lifecycle, Result, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of renders allowed in flight within one wave
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default output directory for writer targets
pub const DEFAULT_OUT_DIR: &str = "out";

/// Environment variable overriding `max_concurrency`
pub const KFORGE_MAX_CONCURRENCY: &str = "KFORGE_MAX_CONCURRENCY";

/// Environment variable overriding `target`
pub const KFORGE_TARGET: &str = "KFORGE_TARGET";

/// Environment variable overriding `out_dir`
pub const KFORGE_OUT_DIR: &str = "KFORGE_OUT_DIR";

/// Environment variable overriding `max_task_duration` (seconds)
pub const KFORGE_MAX_TASK_DURATION: &str = "KFORGE_MAX_TASK_DURATION";

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of concurrent renders within a wave
    pub max_concurrency: usize,

    /// Per-render timeout in seconds
    pub max_task_duration: Option<u64>,

    /// Backend renders are dispatched against
    pub target: TargetKind,

    /// Output directory for writer targets
    pub out_dir: PathBuf,

    /// Lifecycle overrides keyed by task kind (e.g. `SecurityGroup`)
    pub lifecycle_overrides: BTreeMap<String, Lifecycle>,

    /// Terraform writer settings
    pub terraform: TerraformSettings,
}

/// Settings for the Terraform writer targets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerraformSettings {
    /// Provider name for the provider block (e.g. `aws`)
    pub provider: Option<String>,

    /// Region written into the provider block
    pub region: Option<String>,

    /// Extra key/values merged into the provider block
    pub provider_extra_config: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_task_duration: None,
            target: TargetKind::default(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            lifecycle_overrides: BTreeMap::new(),
            terraform: TerraformSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Per-render timeout as a `Duration`
    pub fn task_timeout(&self) -> Option<Duration> {
        self.max_task_duration.map(Duration::from_secs)
    }

    /// Lifecycle override for a task kind, if any
    pub fn lifecycle_override(&self, kind: &str) -> Option<Lifecycle> {
        self.lifecycle_overrides.get(kind).copied()
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::configuration("max_concurrency must be at least 1"));
        }
        if self.max_task_duration == Some(0) {
            return Err(Error::configuration(
                "max_task_duration must be at least 1 second",
            ));
        }
        if self.target.is_writer() && self.out_dir.as_os_str().is_empty() {
            return Err(Error::configuration(format!(
                "out_dir must be set for the {} target",
                self.target
            )));
        }
        Ok(())
    }
}
