use super::{unsupported, Target};
use crate::definition::Task;
use crate::executor::RenderContext;
use crate::resolver::ResolveMode;
use async_trait::async_trait;
use kforge_core::{Result, TargetKind};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Handle to a cloud provider's API
///
/// The engine never calls the API itself; it passes this handle to each
/// task's [`DirectRender`](super::DirectRender) implementation, which
/// downcasts it to the provider client it expects.
pub trait Cloud: Send + Sync + fmt::Debug {
    /// Provider name, e.g. `aws`
    fn provider(&self) -> &str;

    fn region(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Applies changes directly through a [`Cloud`] handle
#[derive(Debug, Clone)]
pub struct DirectTarget {
    cloud: Arc<dyn Cloud>,
}

impl DirectTarget {
    pub fn new(cloud: Arc<dyn Cloud>) -> Self {
        Self { cloud }
    }

    pub fn cloud(&self) -> &Arc<dyn Cloud> {
        &self.cloud
    }
}

#[async_trait]
impl Target for DirectTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Direct
    }

    fn resolve_mode(&self) -> ResolveMode {
        ResolveMode::Concrete
    }

    async fn render(&self, task: &dyn Task, ctx: &mut RenderContext) -> Result<()> {
        let render = task
            .as_direct()
            .ok_or_else(|| unsupported(task, TargetKind::Direct))?;
        render.render_direct(self.cloud.as_ref(), ctx).await
    }
}
