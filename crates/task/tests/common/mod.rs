#![allow(dead_code)]

use async_trait::async_trait;
use kforge_core::{Error, Lifecycle, Result};
use kforge_task::{
    Cloud, CloudFormationRender, CloudFormationWriter, DirectRender, Link, LinkFields, LinkValue,
    LinkVisitor, RenderContext, Task, TerraformRender, TerraformWriter,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Cloud handle that does nothing
#[derive(Debug)]
pub struct FakeCloud;

impl Cloud for FakeCloud {
    fn provider(&self) -> &str {
        "fake"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn cloud() -> Arc<dyn Cloud> {
    Arc::new(FakeCloud)
}

/// Records render order and concurrency across tasks
#[derive(Debug, Default)]
pub struct Recorder {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self, key: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().push(format!("start {key}"));
    }

    fn exit(&self, key: &str) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().push(format!("end {key}"));
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Keys in the order their renders started
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| event.strip_prefix("start ").map(str::to_string))
            .collect()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    Drift,
    AccessDenied,
    Panic,
    Sleep(Duration),
    /// Block until the run is cancelled
    WaitForCancel,
}

/// Configurable task used across the integration tests
#[derive(Debug)]
pub struct TestTask {
    kind: String,
    name: String,
    lifecycle: Lifecycle,
    existing: Option<String>,
    behavior: Behavior,
    links: OnceLock<Vec<Link<TestTask>>>,
    secondary: Mutex<Vec<Arc<dyn Task>>>,
    recorder: Arc<Recorder>,
}

impl TestTask {
    pub fn new(name: &str, recorder: &Arc<Recorder>) -> Self {
        Self {
            kind: "Task".to_string(),
            name: name.to_string(),
            lifecycle: Lifecycle::Sync,
            existing: None,
            behavior: Behavior::Succeed,
            links: OnceLock::new(),
            secondary: Mutex::new(Vec::new()),
            recorder: Arc::clone(recorder),
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_existing(mut self, id: &str) -> Self {
        self.existing = Some(id.to_string());
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Register `task` from this task's render
    pub fn with_secondary(self, task: Arc<dyn Task>) -> Self {
        self.secondary.lock().push(task);
        self
    }

    /// Link this task to the `id` of each of `targets`
    ///
    /// Links are set after construction so that tests can build cycles.
    pub fn depends_on(&self, targets: &[&Arc<TestTask>]) {
        let links: Vec<Link<TestTask>> = targets.iter().map(|target| Link::to(*target)).collect();
        assert!(self.links.set(links).is_ok(), "links already set");
    }

    fn links(&self) -> &[Link<TestTask>] {
        self.links.get().map(Vec::as_slice).unwrap_or_default()
    }

    fn drain_secondary(&self) -> Vec<Arc<dyn Task>> {
        self.secondary.lock().drain(..).collect()
    }

    async fn perform(&self, ctx: &mut RenderContext) -> Result<()> {
        let mut deps = Vec::new();
        for link in self.links() {
            deps.push(ctx.resolve_concrete(link)?);
        }

        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail(message) => {
                return Err(Error::cloud(format!("create {}", self.key()), *message))
            }
            Behavior::Drift => return Err(Error::drift(self.key().to_string(), "tags differ")),
            Behavior::AccessDenied => {
                return Err(Error::insufficient_access(
                    format!("describe {}", self.key()),
                    "not authorized",
                ))
            }
            Behavior::Panic => panic!("render of {} exploded", self.key()),
            Behavior::Sleep(duration) => tokio::time::sleep(*duration).await,
            Behavior::WaitForCancel => {
                ctx.cancellation().cancelled().await;
                return ctx.check_cancelled();
            }
        }

        for task in self.drain_secondary() {
            ctx.register_task(task);
        }
        let id = ctx
            .existing_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-id", self.name));
        ctx.set_id(id);
        if !deps.is_empty() {
            ctx.publish("deps", LinkValue::concrete(deps.join(",")));
        }
        Ok(())
    }
}

impl Task for TestTask {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn visit_links(&self, visitor: &mut dyn LinkVisitor) {
        self.links().iter().enumerate().for_each(|(i, link)| {
            link.visit_fields(&format!("deps[{i}]"), visitor);
        });
    }

    fn existing_identity(&self) -> Option<String> {
        self.existing.clone()
    }

    fn as_direct(&self) -> Option<&dyn DirectRender> {
        Some(self)
    }

    fn as_terraform(&self) -> Option<&dyn TerraformRender> {
        Some(self)
    }

    fn as_cloudformation(&self) -> Option<&dyn CloudFormationRender> {
        Some(self)
    }
}

#[async_trait]
impl DirectRender for TestTask {
    async fn render_direct(&self, _cloud: &dyn Cloud, ctx: &mut RenderContext) -> Result<()> {
        let key = self.key().to_string();
        self.recorder.enter(&key);
        let result = self.perform(ctx).await;
        self.recorder.exit(&key);
        result
    }
}

#[async_trait]
impl TerraformRender for TestTask {
    async fn render_terraform(
        &self,
        writer: &TerraformWriter,
        ctx: &mut RenderContext,
    ) -> Result<()> {
        let mut deps = Vec::new();
        for link in self.links() {
            deps.push(TerraformWriter::literal(&ctx.resolve(link)?)?);
        }
        writer.render_resource(
            "test_resource",
            &self.name,
            json!({ "name": self.name, "depends": deps }),
        )?;
        for task in self.drain_secondary() {
            ctx.register_task(task);
        }
        Ok(())
    }

    fn terraform_link(&self, field: &str) -> Option<String> {
        Some(format!(
            "test_resource.{}.{field}",
            TerraformWriter::sanitize_name(&self.name)
        ))
    }
}

#[async_trait]
impl CloudFormationRender for TestTask {
    async fn render_cloudformation(
        &self,
        writer: &CloudFormationWriter,
        ctx: &mut RenderContext,
    ) -> Result<()> {
        let mut deps = Vec::new();
        for link in self.links() {
            deps.push(CloudFormationWriter::literal(&ctx.resolve(link)?)?);
        }
        writer.render_resource(
            &CloudFormationWriter::logical_id(&self.kind, &self.name),
            "Test::Resource",
            json!({ "Name": self.name, "Depends": deps }),
        )
    }

    fn cloudformation_link(&self, field: &str) -> Option<Value> {
        let logical_id = CloudFormationWriter::logical_id(&self.kind, &self.name);
        Some(match field {
            "id" => json!({ "Ref": logical_id }),
            attribute => json!({ "Fn::GetAtt": [logical_id, attribute] }),
        })
    }
}

/// Task that supports no target at all
#[derive(Debug)]
pub struct Inert(pub &'static str);

impl Task for Inert {
    fn kind(&self) -> &str {
        "Inert"
    }

    fn name(&self) -> &str {
        self.0
    }
}
