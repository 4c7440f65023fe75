use std::path::PathBuf;

/// Result type alias for kforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for kforge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Two tasks registered under the same key
    #[error("task '{task}' is already registered")]
    DuplicateTask { task: String },

    /// A link field points at a task that is not part of the task map
    #[error("task '{task}' field '{field}' links to '{target}', which is not in the task map")]
    DanglingLink {
        task: String,
        field: String,
        target: String,
    },

    /// A task links to itself
    #[error("task '{task}' field '{field}' links to the task itself")]
    SelfLink { task: String, field: String },

    /// The dependency graph contains a cycle
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A link was dereferenced before the referenced task was done
    #[error("link to '{target}.{field}' is unresolved: {message}")]
    UnresolvedLink {
        target: String,
        field: String,
        message: String,
    },

    /// The active target has no renderer for this task
    #[error("task '{task}' cannot be rendered on the {target} target")]
    UnsupportedTarget { task: String, target: String },

    /// Live state differs from the declared state of an observed resource
    #[error("resource '{resource}' has drifted: {message}")]
    Drift { resource: String, message: String },

    /// The cloud API refused the request for lack of permissions
    #[error("insufficient access for {operation}: {message}")]
    InsufficientAccess { operation: String, message: String },

    /// Cloud API or render failure
    #[error("{operation} failed: {message}")]
    Cloud {
        operation: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A run finished with failed or blocked tasks
    #[error("run failed: {} task(s) failed{}, {} task(s) blocked{}", .failed.len(), list_tasks(.failed), .blocked.len(), list_tasks(.blocked))]
    RunFailed {
        failed: Vec<String>,
        blocked: Vec<String>,
    },

    /// The run was cancelled before the operation finished
    #[error("operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    /// Operation timeout errors
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// TOML deserialization errors
    #[error("TOML error: {message}")]
    Toml {
        message: String,
        #[source]
        source: toml::de::Error,
    },
}

fn list_tasks(tasks: &[String]) -> String {
    if tasks.is_empty() {
        String::new()
    } else {
        format!(" ({})", tasks.join(", "))
    }
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Toml {
            message: error.message().to_string(),
            source: error,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Cloud {
            operation: "render".to_string(),
            message: format!("{error:#}"),
            source: Some(error.into()),
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a duplicate task error
    #[must_use]
    pub fn duplicate_task(task: impl Into<String>) -> Self {
        Error::DuplicateTask { task: task.into() }
    }

    /// Create a dangling link error
    #[must_use]
    pub fn dangling_link(
        task: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Error::DanglingLink {
            task: task.into(),
            field: field.into(),
            target: target.into(),
        }
    }

    /// Create a self link error
    #[must_use]
    pub fn self_link(task: impl Into<String>, field: impl Into<String>) -> Self {
        Error::SelfLink {
            task: task.into(),
            field: field.into(),
        }
    }

    /// Create a dependency cycle error from an ordered path whose first and
    /// last entries are the same task
    #[must_use]
    pub fn dependency_cycle(path: Vec<String>) -> Self {
        Error::DependencyCycle { path }
    }

    /// Create an unresolved link error
    #[must_use]
    pub fn unresolved_link(
        target: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::UnresolvedLink {
            target: target.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported target error
    #[must_use]
    pub fn unsupported_target(task: impl Into<String>, target: impl Into<String>) -> Self {
        Error::UnsupportedTarget {
            task: task.into(),
            target: target.into(),
        }
    }

    /// Create a drift error
    #[must_use]
    pub fn drift(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Drift {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create an insufficient access error
    #[must_use]
    pub fn insufficient_access(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InsufficientAccess {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a cloud API error
    #[must_use]
    pub fn cloud(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Cloud {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a cloud API error with a source error
    #[must_use]
    pub fn cloud_with_source(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Cloud {
            operation: operation.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a run failure summary
    #[must_use]
    pub fn run_failed(failed: Vec<String>, blocked: Vec<String>) -> Self {
        Error::RunFailed { failed, blocked }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Error::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Structural errors are detected before rendering and abort the run
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTask { .. }
                | Error::DanglingLink { .. }
                | Error::SelfLink { .. }
                | Error::DependencyCycle { .. }
        )
    }

    pub fn is_drift(&self) -> bool {
        matches!(self, Error::Drift { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::InsufficientAccess { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", message.into(), base_error),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", f(), base_error),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = Error::dependency_cycle(vec![
            "Task/A".to_string(),
            "Task/B".to_string(),
            "Task/A".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: Task/A -> Task/B -> Task/A"
        );
        assert!(err.is_structural());
    }

    #[test]
    fn test_classification() {
        assert!(Error::drift("VPC/main", "cidr changed").is_drift());
        assert!(Error::insufficient_access("DescribeVpcs", "403").is_access_denied());
        assert!(Error::cancelled("render").is_cancelled());
        assert!(!Error::cloud("CreateVpc", "boom").is_structural());
    }

    #[test]
    fn test_run_failed_message() {
        let err = Error::run_failed(vec!["Task/B".to_string()], vec!["Task/C".to_string()]);
        assert_eq!(
            err.to_string(),
            "run failed: 1 task(s) failed (Task/B), 1 task(s) blocked (Task/C)"
        );
    }

    #[test]
    fn test_anyhow_maps_to_cloud_error() {
        let err: Error = anyhow::anyhow!("api unavailable").into();
        assert!(matches!(err, Error::Cloud { .. }));
        assert!(err.to_string().contains("api unavailable"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), Error> = Err(Error::cloud("CreateSubnet", "quota"));
        let err = result.context("creating subnet").unwrap_err();
        assert!(err.to_string().contains("creating subnet"));
        assert!(err.to_string().contains("quota"));
    }
}
