//! Task contract
//!
//! A task is one unit of desired infrastructure state: a VPC, a subnet, an
//! instance group. Model builders create tasks, wire them together with
//! [`Link`](crate::link::Link) fields and hand them to the executor inside a
//! [`TaskMap`](crate::task_map::TaskMap). The executor never looks inside a
//! task beyond what this trait exposes.

use crate::link::LinkVisitor;
use crate::target::{CloudFormationRender, DirectRender, TerraformRender};
use kforge_core::Lifecycle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of a task within one task map, formatted `Kind/Name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(kind: &str, name: &str) -> Self {
        Self(format!("{kind}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `/`
    pub fn kind(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(kind, _)| kind)
    }

    /// The part after the first `/`
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, name)| name)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for TaskKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unit of declared infrastructure state with a render contract
///
/// Implementations expose their link fields through
/// [`visit_links`](Task::visit_links) so the dependency analyzer can discover
/// edges without hand-maintained lists, and opt into render targets by
/// returning `Some` from the matching `as_*` accessor. Targets whose accessor
/// returns `None` fail the task with an unsupported-target error.
pub trait Task: Send + Sync + fmt::Debug + 'static {
    /// Resource kind, e.g. `VPC` or `Subnet`
    fn kind(&self) -> &str;

    /// Name unique among tasks of the same kind
    fn name(&self) -> &str;

    fn key(&self) -> TaskKey {
        TaskKey::new(self.kind(), self.name())
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    /// Report every link field to `visitor`
    ///
    /// Field paths should match the struct field names, with `[index]` or
    /// `[key]` suffixes for sequences and maps.
    fn visit_links(&self, _visitor: &mut dyn LinkVisitor) {}

    /// Identity of a resource that already exists outside this run
    ///
    /// Seeds the task's `id` output before render. For `Ignore` tasks it is
    /// the only output dependents will ever see.
    fn existing_identity(&self) -> Option<String> {
        None
    }

    fn as_direct(&self) -> Option<&dyn DirectRender> {
        None
    }

    fn as_terraform(&self) -> Option<&dyn TerraformRender> {
        None
    }

    fn as_cloudformation(&self) -> Option<&dyn CloudFormationRender> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_key_parts() {
        let key = TaskKey::new("RouteTableAssociation", "private-us-east-1a/main");
        assert_eq!(key.as_str(), "RouteTableAssociation/private-us-east-1a/main");
        assert_eq!(key.kind(), "RouteTableAssociation");
        assert_eq!(key.name(), "private-us-east-1a/main");
    }

    #[test]
    fn test_task_key_ordering_is_lexical() {
        let mut keys = vec![
            TaskKey::new("VPC", "main"),
            TaskKey::new("Subnet", "b"),
            TaskKey::new("Subnet", "a"),
        ];
        keys.sort();
        let names: Vec<_> = keys.iter().map(TaskKey::as_str).collect();
        assert_eq!(names, vec!["Subnet/a", "Subnet/b", "VPC/main"]);
    }
}
