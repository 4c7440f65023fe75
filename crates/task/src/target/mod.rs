//! Render targets
//!
//! A [`Target`] is the backend a run dispatches renders against. Tasks opt
//! into each target by implementing its render trait and returning it from
//! the matching `Task::as_*` accessor; a task without one fails fast with
//! an unsupported-target error.

mod cloudformation;
mod direct;
mod dryrun;
mod terraform;

pub use cloudformation::{CloudFormationTarget, CloudFormationWriter, CLOUDFORMATION_TEMPLATE_FILE};
pub use direct::{Cloud, DirectTarget};
pub use dryrun::{DryRunTarget, PlannedChange, DRYRUN_REPORT_FILE};
pub use terraform::{
    TerraformFormat, TerraformTarget, TerraformWriter, TERRAFORM_DATA_DIR, TERRAFORM_HCL_FILE,
    TERRAFORM_JSON_FILE,
};

use crate::definition::Task;
use crate::executor::RenderContext;
use crate::resolver::ResolveMode;
use crate::task_map::TaskMap;
use async_trait::async_trait;
use kforge_config::EngineConfig;
use kforge_core::{Error, Result, TargetKind};
use std::sync::Arc;

/// Backend a run renders against
#[async_trait]
pub trait Target: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// How links are read while rendering against this target
    fn resolve_mode(&self) -> ResolveMode;

    /// Called once before the first render of every run
    ///
    /// Writer targets drop whatever a previous run accumulated.
    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    /// Dispatch one task's render
    async fn render(&self, task: &dyn Task, ctx: &mut RenderContext) -> Result<()>;

    /// Called once after every task is done; never after a failed run
    async fn finish(&self, _tasks: &TaskMap) -> Result<()> {
        Ok(())
    }
}

/// Render entry point for applying changes through a cloud API
#[async_trait]
pub trait DirectRender: Send + Sync {
    async fn render_direct(&self, cloud: &dyn Cloud, ctx: &mut RenderContext) -> Result<()>;
}

/// Render entry point for emitting Terraform
#[async_trait]
pub trait TerraformRender: Send + Sync {
    async fn render_terraform(&self, writer: &TerraformWriter, ctx: &mut RenderContext)
        -> Result<()>;

    /// Expression for `field` of this task's resource, without `${}`
    ///
    /// Used when a dependent links a field the task never published.
    fn terraform_link(&self, _field: &str) -> Option<String> {
        None
    }
}

/// Render entry point for emitting a CloudFormation template
#[async_trait]
pub trait CloudFormationRender: Send + Sync {
    async fn render_cloudformation(
        &self,
        writer: &CloudFormationWriter,
        ctx: &mut RenderContext,
    ) -> Result<()>;

    /// Intrinsic for `field` of this task's resource
    fn cloudformation_link(&self, _field: &str) -> Option<serde_json::Value> {
        None
    }
}

pub(crate) fn unsupported(task: &dyn Task, target: TargetKind) -> Error {
    Error::unsupported_target(task.key().as_str(), target.as_str())
}

/// Build the target named in `config`
///
/// The direct target needs a cloud handle; the others write under
/// `config.out_dir`.
pub fn from_config(config: &EngineConfig, cloud: Option<Arc<dyn Cloud>>) -> Result<Arc<dyn Target>> {
    let target: Arc<dyn Target> = match config.target {
        TargetKind::Direct => {
            let cloud = cloud.ok_or_else(|| {
                Error::configuration("the direct target requires a cloud handle")
            })?;
            Arc::new(DirectTarget::new(cloud))
        }
        TargetKind::Terraform => Arc::new(TerraformTarget::new(
            TerraformFormat::Hcl,
            &config.out_dir,
            config.terraform.clone(),
        )),
        TargetKind::TerraformJson => Arc::new(TerraformTarget::new(
            TerraformFormat::Json,
            &config.out_dir,
            config.terraform.clone(),
        )),
        TargetKind::CloudFormation => Arc::new(CloudFormationTarget::new(&config.out_dir)),
        TargetKind::DryRun => Arc::new(DryRunTarget::new().with_report_dir(&config.out_dir)),
    };
    tracing::debug!(target = %config.target, "Created render target");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_picks_target() {
        let mut config = EngineConfig::default();
        assert!(from_config(&config, None).is_err());

        for kind in [
            TargetKind::Terraform,
            TargetKind::TerraformJson,
            TargetKind::CloudFormation,
            TargetKind::DryRun,
        ] {
            config.target = kind;
            let target = from_config(&config, None).unwrap();
            assert_eq!(target.kind(), kind);
        }
    }
}
