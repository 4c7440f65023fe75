//! Link-driven dependency discovery

use crate::definition::{Task, TaskKey};
use crate::link::{AnyLink, LinkVisitor};
use crate::task_map::TaskMap;
use kforge_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// For every task, the set of tasks that must be done before it renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    dependencies: BTreeMap<TaskKey, BTreeSet<TaskKey>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no dependencies (no-op if present)
    pub fn add_task(&mut self, key: TaskKey) {
        self.dependencies.entry(key).or_default();
    }

    /// Record that `task` links `depends_on`, adding both nodes if missing
    pub fn add_dependency(&mut self, task: TaskKey, depends_on: TaskKey) {
        self.add_task(depends_on.clone());
        self.dependencies.entry(task).or_default().insert(depends_on);
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.dependencies.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.dependencies.keys()
    }

    /// Tasks `key` links directly
    pub fn dependencies_of(&self, key: &TaskKey) -> impl Iterator<Item = &TaskKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    /// Tasks that link `key` directly
    pub fn dependents_of<'a>(&'a self, key: &'a TaskKey) -> impl Iterator<Item = &'a TaskKey> {
        self.dependencies
            .iter()
            .filter(move |(_, deps)| deps.contains(key))
            .map(|(task, _)| task)
    }

    /// All edges as `(before, after)` pairs, in key order
    pub fn edges(&self) -> Vec<(TaskKey, TaskKey)> {
        self.dependencies
            .iter()
            .flat_map(|(task, deps)| deps.iter().map(move |dep| (dep.clone(), task.clone())))
            .collect()
    }
}

/// Result of a non-strict analysis
#[derive(Debug, Default)]
pub struct Analysis {
    pub graph: DependencyGraph,
    /// Tasks with invalid links; those links are left out of `graph`
    pub errors: Vec<(TaskKey, Error)>,
}

/// Derives dependency edges from the links each task declares
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// Walk every task's links, collecting edges and per-task errors
    pub fn analyze(tasks: &TaskMap) -> Analysis {
        let mut analysis = Analysis::default();

        for (key, task) in tasks.iter() {
            let mut collector = EdgeCollector {
                tasks,
                owner: key,
                owner_task: task,
                dependencies: BTreeSet::new(),
                errors: Vec::new(),
            };
            task.visit_links(&mut collector);

            analysis.graph.add_task(key.clone());
            for dep in collector.dependencies {
                analysis.graph.add_dependency(key.clone(), dep);
            }
            analysis
                .errors
                .extend(collector.errors.into_iter().map(|e| (key.clone(), e)));
        }

        tracing::debug!(
            tasks = analysis.graph.len(),
            errors = analysis.errors.len(),
            "Dependency analysis complete"
        );
        analysis
    }

    /// Like [`analyze`](Self::analyze) but fails on the first invalid link
    pub fn analyze_strict(tasks: &TaskMap) -> Result<DependencyGraph> {
        let analysis = Self::analyze(tasks);
        match analysis.errors.into_iter().next() {
            Some((_, error)) => Err(error),
            None => Ok(analysis.graph),
        }
    }
}

struct EdgeCollector<'a> {
    tasks: &'a TaskMap,
    owner: &'a TaskKey,
    owner_task: &'a Arc<dyn Task>,
    dependencies: BTreeSet<TaskKey>,
    errors: Vec<Error>,
}

impl LinkVisitor for EdgeCollector<'_> {
    fn visit(&mut self, path: &str, link: &dyn AnyLink) {
        if link.points_to(self.owner_task) {
            self.errors
                .push(Error::self_link(self.owner.as_str(), path));
            return;
        }

        let target = link.target_task().key();
        match self.tasks.get(&target) {
            // Same key is not enough: the map must hold this exact object
            Some(mapped) if link.points_to(mapped) => {
                self.dependencies.insert(target);
            }
            _ => self.errors.push(Error::dangling_link(
                self.owner.as_str(),
                path,
                target.as_str(),
            )),
        }
    }
}
