//! The collection of tasks a run operates on
//!
//! Model builders populate a [`TaskMap`] before the run. During the run only
//! the executor inserts into it, by draining secondary registrations between
//! waves.

use crate::definition::{Task, TaskKey};
use kforge_config::EngineConfig;
use kforge_core::{Error, Lifecycle, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct TaskEntry {
    task: Arc<dyn Task>,
    lifecycle: Lifecycle,
}

/// Tasks keyed by `Kind/Name`, iterated in key order
#[derive(Debug, Clone, Default)]
pub struct TaskMap {
    entries: BTreeMap<TaskKey, TaskEntry>,
    overrides: BTreeMap<String, Lifecycle>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty map that applies the configured lifecycle overrides
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new().with_lifecycle_overrides(config.lifecycle_overrides.clone())
    }

    /// Override the lifecycle of every task of a given kind
    ///
    /// Applies to tasks already present and to tasks added later.
    pub fn with_lifecycle_overrides(mut self, overrides: BTreeMap<String, Lifecycle>) -> Self {
        self.overrides = overrides;
        for (key, entry) in &mut self.entries {
            if let Some(lifecycle) = self.overrides.get(key.kind()) {
                entry.lifecycle = *lifecycle;
            }
        }
        self
    }

    /// Insert a type-erased task, rejecting a key that is already taken
    pub fn add_task(&mut self, task: Arc<dyn Task>) -> Result<TaskKey> {
        let key = task.key();
        if self.entries.contains_key(&key) {
            return Err(Error::duplicate_task(key.as_str()));
        }

        let lifecycle = self
            .overrides
            .get(task.kind())
            .copied()
            .unwrap_or_else(|| task.lifecycle());
        tracing::trace!(task = %key, lifecycle = %lifecycle, "Adding task");
        self.entries
            .insert(key.clone(), TaskEntry { task, lifecycle });
        Ok(key)
    }

    /// Insert a task and hand back the shared handle used to link to it
    pub fn add<T: Task>(&mut self, task: T) -> Result<Arc<T>> {
        let task = Arc::new(task);
        self.add_task(task.clone())?;
        Ok(task)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Arc<dyn Task>> {
        self.entries.get(key).map(|entry| &entry.task)
    }

    /// Effective lifecycle, after overrides
    pub fn lifecycle(&self, key: &TaskKey) -> Option<Lifecycle> {
        self.entries.get(key).map(|entry| entry.lifecycle)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Arc<dyn Task>)> {
        self.entries.iter().map(|(key, entry)| (key, &entry.task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Named {
        kind: &'static str,
        name: &'static str,
        lifecycle: Lifecycle,
    }

    impl Task for Named {
        fn kind(&self) -> &str {
            self.kind
        }
        fn name(&self) -> &str {
            self.name
        }
        fn lifecycle(&self) -> Lifecycle {
            self.lifecycle
        }
    }

    fn named(kind: &'static str, name: &'static str) -> Named {
        Named {
            kind,
            name,
            lifecycle: Lifecycle::Sync,
        }
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut tasks = TaskMap::new();
        tasks.add(named("VPC", "main")).unwrap();
        let err = tasks.add(named("VPC", "main")).unwrap_err();
        assert!(matches!(err, Error::DuplicateTask { ref task } if task == "VPC/main"));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_same_name_different_kind() {
        let mut tasks = TaskMap::new();
        tasks.add(named("VPC", "main")).unwrap();
        tasks.add(named("Subnet", "main")).unwrap();
        let keys: Vec<_> = tasks.keys().map(TaskKey::as_str).collect();
        assert_eq!(keys, vec!["Subnet/main", "VPC/main"]);
    }

    #[test]
    fn test_lifecycle_override_by_kind() {
        let mut tasks = TaskMap::new();
        tasks.add(named("SecurityGroup", "web")).unwrap();
        tasks
            .add(Named {
                kind: "VPC",
                name: "shared",
                lifecycle: Lifecycle::Ignore,
            })
            .unwrap();

        let mut tasks = tasks.with_lifecycle_overrides(BTreeMap::from([(
            "SecurityGroup".to_string(),
            Lifecycle::ExistsAndWarnIfChanges,
        )]));
        tasks.add(named("SecurityGroup", "db")).unwrap();

        assert_eq!(
            tasks.lifecycle(&TaskKey::new("SecurityGroup", "web")),
            Some(Lifecycle::ExistsAndWarnIfChanges)
        );
        assert_eq!(
            tasks.lifecycle(&TaskKey::new("SecurityGroup", "db")),
            Some(Lifecycle::ExistsAndWarnIfChanges)
        );
        assert_eq!(
            tasks.lifecycle(&TaskKey::new("VPC", "shared")),
            Some(Lifecycle::Ignore)
        );
    }

    #[test]
    fn test_from_config_carries_overrides() {
        let mut config = EngineConfig::default();
        config
            .lifecycle_overrides
            .insert("VPC".to_string(), Lifecycle::Ignore);
        let mut tasks = TaskMap::from_config(&config);
        let key = tasks.add_task(Arc::new(named("VPC", "main"))).unwrap();
        assert_eq!(tasks.lifecycle(&key), Some(Lifecycle::Ignore));
    }
}
