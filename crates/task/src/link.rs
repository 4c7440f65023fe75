//! Typed references between tasks
//!
//! A [`Link`] holds the dependency task object itself plus the name of the
//! output field being referenced. It never copies a value: reading it goes
//! through the [`LinkResolver`](crate::resolver::LinkResolver), which decides
//! between a concrete value and a symbolic expression depending on the target.
//!
//! Tasks declare their links by implementing
//! [`Task::visit_links`](crate::definition::Task::visit_links), usually by
//! calling [`LinkFields::visit_fields`] on each link-carrying field.

use crate::definition::{Task, TaskKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Output field every task exposes once it has an identity
pub const ID_FIELD: &str = "id";

/// A typed reference to an output field of another task
pub struct Link<T: Task + ?Sized = dyn Task> {
    task: Arc<T>,
    erased: Arc<dyn Task>,
    field: Cow<'static, str>,
}

impl<T: Task> Link<T> {
    /// Link to the `id` output of `task`
    pub fn to(task: &Arc<T>) -> Self {
        Self::to_field(task, ID_FIELD)
    }

    /// Link to a named output of `task`
    pub fn to_field(task: &Arc<T>, field: impl Into<Cow<'static, str>>) -> Self {
        let erased: Arc<dyn Task> = task.clone();
        Self {
            task: Arc::clone(task),
            erased,
            field: field.into(),
        }
    }
}

impl Link<dyn Task> {
    /// Link to an output of a task whose concrete type is not known
    pub fn dynamic(task: &Arc<dyn Task>, field: impl Into<Cow<'static, str>>) -> Self {
        Self {
            task: Arc::clone(task),
            erased: Arc::clone(task),
            field: field.into(),
        }
    }
}

impl<T: Task + ?Sized> Link<T> {
    /// The referenced task
    pub fn target(&self) -> &Arc<T> {
        &self.task
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn reference(&self) -> LinkRef {
        LinkRef {
            task: self.erased.key(),
            field: self.field.to_string(),
        }
    }
}

impl<T: Task + ?Sized> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            erased: Arc::clone(&self.erased),
            field: self.field.clone(),
        }
    }
}

impl<T: Task + ?Sized> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("task", &self.erased.key())
            .field("field", &self.field)
            .finish()
    }
}

/// Name-level description of a link, detached from the task object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkRef {
    pub task: TaskKey,
    pub field: String,
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task, self.field)
    }
}

/// Type-erased view of a link, as seen by the analyzer and resolver
pub trait AnyLink: Send + Sync {
    /// The referenced task
    fn target_task(&self) -> &Arc<dyn Task>;

    /// The referenced output field
    fn field(&self) -> &str;

    fn reference(&self) -> LinkRef {
        LinkRef {
            task: self.target_task().key(),
            field: self.field().to_string(),
        }
    }

    /// Whether this link holds exactly `task` (object identity, not key)
    fn points_to(&self, task: &Arc<dyn Task>) -> bool {
        Arc::as_ptr(self.target_task()) as *const () == Arc::as_ptr(task) as *const ()
    }
}

impl<T: Task + ?Sized> AnyLink for Link<T> {
    fn target_task(&self) -> &Arc<dyn Task> {
        &self.erased
    }

    fn field(&self) -> &str {
        &self.field
    }
}

/// Receives every link a task declares
pub trait LinkVisitor {
    /// `path` names the field holding the link, e.g. `subnets[2]`
    fn visit(&mut self, path: &str, link: &dyn AnyLink);
}

/// Field types that may carry links
pub trait LinkFields {
    fn visit_fields(&self, path: &str, visitor: &mut dyn LinkVisitor);
}

impl<T: Task + ?Sized> LinkFields for Link<T> {
    fn visit_fields(&self, path: &str, visitor: &mut dyn LinkVisitor) {
        visitor.visit(path, self);
    }
}

impl<L: LinkFields> LinkFields for Option<L> {
    fn visit_fields(&self, path: &str, visitor: &mut dyn LinkVisitor) {
        if let Some(inner) = self {
            inner.visit_fields(path, visitor);
        }
    }
}

impl<L: LinkFields> LinkFields for Vec<L> {
    fn visit_fields(&self, path: &str, visitor: &mut dyn LinkVisitor) {
        for (i, item) in self.iter().enumerate() {
            item.visit_fields(&format!("{path}[{i}]"), visitor);
        }
    }
}

impl<L: LinkFields> LinkFields for BTreeMap<String, L> {
    fn visit_fields(&self, path: &str, visitor: &mut dyn LinkVisitor) {
        for (key, item) in self {
            item.visit_fields(&format!("{path}[{key}]"), visitor);
        }
    }
}

impl<L: LinkFields> LinkFields for IndexMap<String, L> {
    fn visit_fields(&self, path: &str, visitor: &mut dyn LinkVisitor) {
        for (key, item) in self {
            item.visit_fields(&format!("{path}[{key}]"), visitor);
        }
    }
}

/// Collects `(path, reference)` pairs; handy for tests and diagnostics
#[derive(Debug, Default)]
pub struct LinkCollector {
    pub links: Vec<(String, LinkRef)>,
}

impl LinkVisitor for LinkCollector {
    fn visit(&mut self, path: &str, link: &dyn AnyLink) {
        self.links.push((path.to_string(), link.reference()));
    }
}

/// All links declared by `task`, in visit order
pub fn links_of(task: &dyn Task) -> Vec<(String, LinkRef)> {
    let mut collector = LinkCollector::default();
    task.visit_links(&mut collector);
    collector.links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Vpc;

    impl Task for Vpc {
        fn kind(&self) -> &str {
            "VPC"
        }
        fn name(&self) -> &str {
            "main"
        }
    }

    #[derive(Debug)]
    struct LoadBalancer {
        vpc: Link<Vpc>,
        subnets: Vec<Link<Vpc>>,
        security_group: Option<Link>,
        tags: BTreeMap<String, Link<Vpc>>,
    }

    impl Task for LoadBalancer {
        fn kind(&self) -> &str {
            "LoadBalancer"
        }
        fn name(&self) -> &str {
            "api"
        }
        fn visit_links(&self, visitor: &mut dyn LinkVisitor) {
            self.vpc.visit_fields("vpc", visitor);
            self.subnets.visit_fields("subnets", visitor);
            self.security_group.visit_fields("security_group", visitor);
            self.tags.visit_fields("tags", visitor);
        }
    }

    #[test]
    fn test_visit_collects_nested_paths() {
        let vpc = Arc::new(Vpc);
        let lb = LoadBalancer {
            vpc: Link::to(&vpc),
            subnets: vec![Link::to_field(&vpc, "cidr"), Link::to(&vpc)],
            security_group: None,
            tags: BTreeMap::from([("owner".to_string(), Link::to_field(&vpc, "arn"))]),
        };

        let links = links_of(&lb);
        let paths: Vec<_> = links.iter().map(|(p, r)| format!("{p}={r}")).collect();
        assert_eq!(
            paths,
            vec![
                "vpc=VPC/main.id",
                "subnets[0]=VPC/main.cidr",
                "subnets[1]=VPC/main.id",
                "tags[owner]=VPC/main.arn",
            ]
        );
    }

    #[test]
    fn test_points_to_uses_object_identity() {
        let vpc = Arc::new(Vpc);
        let other = Arc::new(Vpc);
        let link = Link::to(&vpc);

        let same: Arc<dyn Task> = vpc.clone();
        let lookalike: Arc<dyn Task> = other;
        assert!(link.points_to(&same));
        assert!(!link.points_to(&lookalike));
        assert_eq!(link.reference(), LinkRef {
            task: TaskKey::new("VPC", "main"),
            field: ID_FIELD.to_string(),
        });
    }

    #[test]
    fn test_dynamic_link() {
        let vpc: Arc<dyn Task> = Arc::new(Vpc);
        let link = Link::dynamic(&vpc, "arn");
        assert_eq!(link.field(), "arn");
        assert!(link.points_to(&vpc));
        assert_eq!(link.clone().reference().to_string(), "VPC/main.arn");
    }
}
