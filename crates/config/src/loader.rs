//! Configuration loader for kforge
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! `KFORGE_*` environment variables.

use crate::config::{
    EngineConfig, KFORGE_MAX_CONCURRENCY, KFORGE_MAX_TASK_DURATION, KFORGE_OUT_DIR, KFORGE_TARGET,
};
use kforge_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Loads an [`EngineConfig`] from file and environment
pub struct ConfigLoader {
    /// Optional TOML file to read
    file: Option<PathBuf>,
    /// Whether `KFORGE_*` variables are applied
    use_env: bool,
}

impl ConfigLoader {
    /// Create a loader that only applies environment overrides
    pub fn new() -> Self {
        Self {
            file: None,
            use_env: true,
        }
    }

    /// Read settings from a TOML file
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Enable or disable environment overrides
    pub fn use_env(mut self, use_env: bool) -> Self {
        self.use_env = use_env;
        self
    }

    /// Load and validate the configuration
    pub fn load(self) -> Result<EngineConfig> {
        let mut config = match &self.file {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if self.use_env {
            config.apply_env_overrides_from(|name| std::env::var(name).ok())?;
        }

        config.validate()?;
        tracing::debug!(
            max_concurrency = config.max_concurrency,
            target = %config.target,
            out_dir = %config.out_dir.display(),
            "Loaded engine configuration"
        );
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::file_system(path, "read", e))?;
        Self::from_toml_str(&contents).map_err(|e| {
            Error::configuration(format!("invalid config file '{}': {e}", path.display()))
        })
    }

    /// Defaults plus process environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `KFORGE_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `KFORGE_*` overrides using the given lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(KFORGE_MAX_CONCURRENCY) {
            self.max_concurrency = value.trim().parse().map_err(|_| {
                Error::configuration(format!("{KFORGE_MAX_CONCURRENCY} must be a number, got '{value}'"))
            })?;
        }
        if let Some(value) = lookup(KFORGE_MAX_TASK_DURATION) {
            let secs = value.trim().parse().map_err(|_| {
                Error::configuration(format!(
                    "{KFORGE_MAX_TASK_DURATION} must be a number of seconds, got '{value}'"
                ))
            })?;
            self.max_task_duration = Some(secs);
        }
        if let Some(value) = lookup(KFORGE_TARGET) {
            self.target = value.parse()?;
        }
        if let Some(value) = lookup(KFORGE_OUT_DIR) {
            self.out_dir = PathBuf::from(value);
        }
        Ok(())
    }
}
