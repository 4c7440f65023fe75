//! Task-graph engine for kforge
//!
//! Model builders describe desired infrastructure as [`Task`]s that refer to
//! each other through typed [`Link`]s. The engine derives the dependency
//! graph from those links, plans it into waves, renders each wave
//! concurrently against a [`Target`] and resolves links lazily so that a
//! task can refer to an identifier the cloud has not assigned yet.
//!
//! ```text
//! TaskMap ──► DependencyAnalyzer ──► plan_waves ──► Executor::run ──► RunReport
//!                                                      │
//!                                       Target::render / LinkResolver
//! ```

pub mod definition;
pub mod executor;
pub mod link;
pub mod resolver;
pub mod target;
pub mod task_map;

pub use definition::{Task, TaskKey};
pub use executor::{
    find_cycles, next_wave, plan_waves, Analysis, BlockReason, BlockedTask, DependencyAnalyzer,
    DependencyGraph, ExecutionPlan, Executor, RenderContext, RunOutcome, RunReport, TaskFailure,
    TaskStatus, TaskWarning,
};
pub use link::{links_of, AnyLink, Link, LinkCollector, LinkFields, LinkRef, LinkVisitor, ID_FIELD};
pub use resolver::{LinkResolver, LinkValue, OutputStore, Outputs, ResolveMode};
pub use target::{
    Cloud, CloudFormationRender, CloudFormationTarget, CloudFormationWriter, DirectRender,
    DirectTarget, DryRunTarget, PlannedChange, Target, TerraformFormat, TerraformRender,
    TerraformTarget, TerraformWriter, CLOUDFORMATION_TEMPLATE_FILE, DRYRUN_REPORT_FILE,
    TERRAFORM_DATA_DIR, TERRAFORM_HCL_FILE, TERRAFORM_JSON_FILE,
};
pub use task_map::TaskMap;
