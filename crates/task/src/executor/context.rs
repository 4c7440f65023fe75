use crate::definition::{Task, TaskKey};
use crate::link::{AnyLink, ID_FIELD};
use crate::resolver::{LinkResolver, LinkValue, Outputs, ResolveMode};
use kforge_core::{Error, Lifecycle, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run-scoped handle passed to every render call
///
/// Renders read their links through it, publish the outputs other tasks may
/// link to, and queue secondary tasks. Nothing here touches the task map
/// directly: the executor applies outputs and registrations after the wave.
pub struct RenderContext {
    key: TaskKey,
    lifecycle: Lifecycle,
    resolver: LinkResolver,
    outputs: Outputs,
    registered: Vec<Arc<dyn Task>>,
    cancel: CancellationToken,
}

impl RenderContext {
    pub fn new(
        key: TaskKey,
        lifecycle: Lifecycle,
        resolver: LinkResolver,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key,
            lifecycle,
            resolver,
            outputs: Outputs::new(),
            registered: Vec::new(),
            cancel,
        }
    }

    /// Key of the task being rendered
    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Effective lifecycle of the task being rendered
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn resolve_mode(&self) -> ResolveMode {
        self.resolver.mode()
    }

    /// Read a link in the form the active target accepts
    pub fn resolve(&self, link: &dyn AnyLink) -> Result<LinkValue> {
        self.resolver.resolve(link)
    }

    /// Read a link that must have a real value
    pub fn resolve_concrete(&self, link: &dyn AnyLink) -> Result<String> {
        match self.resolver.resolve(link)? {
            LinkValue::Concrete(value) => Ok(value),
            other => {
                let reference = link.reference();
                Err(Error::unresolved_link(
                    reference.task.as_str(),
                    &reference.field,
                    format!("expected a concrete value, got '{other}'"),
                ))
            }
        }
    }

    /// Make `value` readable through links to `field` of this task
    pub fn publish(&mut self, field: impl Into<String>, value: LinkValue) {
        self.outputs.insert(field.into(), value);
    }

    /// Publish the concrete identity of this task's resource
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.publish(ID_FIELD, LinkValue::Concrete(id.into()));
    }

    pub fn output(&self, field: &str) -> Option<&LinkValue> {
        self.outputs.get(field)
    }

    /// Identity seeded from [`Task::existing_identity`], if any
    pub fn existing_id(&self) -> Option<&str> {
        self.outputs.get(ID_FIELD).and_then(LinkValue::as_concrete)
    }

    /// Queue a secondary task for insertion after the current wave
    pub fn register_task(&mut self, task: Arc<dyn Task>) {
        tracing::debug!(task = %task.key(), registered_by = %self.key, "Queued secondary task");
        self.registered.push(task);
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with a cancellation error if the run was cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::cancelled(self.key.as_str()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn into_parts(self) -> (Outputs, Vec<Arc<dyn Task>>) {
        (self.outputs, self.registered)
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("key", &self.key)
            .field("lifecycle", &self.lifecycle)
            .field("mode", &self.resolver.mode())
            .field("outputs", &self.outputs)
            .field("registered", &self.registered.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Task;
    use crate::link::Link;
    use crate::resolver::OutputStore;

    #[derive(Debug)]
    struct Bucket;

    impl Task for Bucket {
        fn kind(&self) -> &str {
            "Bucket"
        }
        fn name(&self) -> &str {
            "state"
        }
    }

    fn context(store: &Arc<OutputStore>, mode: ResolveMode) -> RenderContext {
        RenderContext::new(
            TaskKey::new("Instance", "master"),
            Lifecycle::Sync,
            LinkResolver::new(Arc::clone(store), mode),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_publish_and_into_parts() {
        let store = Arc::new(OutputStore::new());
        let mut ctx = context(&store, ResolveMode::Concrete);
        assert_eq!(ctx.existing_id(), None);

        ctx.set_id("i-123");
        ctx.publish("private_ip", LinkValue::concrete("10.0.0.5"));
        ctx.register_task(Arc::new(Bucket));
        assert_eq!(ctx.existing_id(), Some("i-123"));

        let (outputs, registered) = ctx.into_parts();
        assert_eq!(outputs.len(), 2);
        assert_eq!(registered[0].key().as_str(), "Bucket/state");
    }

    #[test]
    fn test_resolve_concrete_rejects_placeholders() {
        let store = Arc::new(OutputStore::new());
        let bucket = Arc::new(Bucket);
        store.freeze(bucket.key(), Outputs::new());
        let link = Link::to(&bucket);

        let ctx = context(&store, ResolveMode::Placeholder);
        assert!(matches!(ctx.resolve(&link), Ok(LinkValue::Placeholder(_))));
        assert!(ctx.resolve_concrete(&link).is_err());
    }

    #[test]
    fn test_check_cancelled() {
        let store = Arc::new(OutputStore::new());
        let ctx = context(&store, ResolveMode::Concrete);
        assert!(ctx.check_cancelled().is_ok());

        ctx.cancellation().cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check_cancelled().unwrap_err().is_cancelled());
    }
}
