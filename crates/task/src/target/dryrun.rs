use super::Target;
use crate::definition::{Task, TaskKey};
use crate::executor::RenderContext;
use crate::link::{AnyLink, LinkVisitor};
use crate::resolver::{LinkValue, ResolveMode};
use crate::task_map::TaskMap;
use async_trait::async_trait;
use kforge_core::{Error, Lifecycle, Result, TargetKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

pub const DRYRUN_REPORT_FILE: &str = "dryrun.txt";

/// What a run would do to one task's resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    pub task: TaskKey,
    pub lifecycle: Lifecycle,
    /// Identity of a resource that already exists; the change is an update
    pub existing: Option<String>,
    /// Every declared link with the value it resolved to
    pub links: Vec<(String, LinkValue)>,
}

/// Plans a run without side effects
///
/// Task render code is never called. Each task's links are resolved so that
/// a link to a task outside the map or to an unfinished task still fails the
/// way it would for a real target; values that would only exist after apply
/// come back as placeholders.
#[derive(Debug, Default)]
pub struct DryRunTarget {
    report_dir: Option<PathBuf>,
    changes: Mutex<Vec<PlannedChange>>,
}

struct LinkRecorder<'a> {
    ctx: &'a RenderContext,
    links: Vec<(String, LinkValue)>,
    error: Option<Error>,
}

impl LinkVisitor for LinkRecorder<'_> {
    fn visit(&mut self, path: &str, link: &dyn AnyLink) {
        if self.error.is_some() {
            return;
        }
        match self.ctx.resolve(link) {
            Ok(value) => self.links.push((path.to_string(), value)),
            Err(e) => self.error = Some(e),
        }
    }
}

impl DryRunTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write the report to `dir` when the run finishes
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Planned changes so far, sorted by task key
    pub fn changes(&self) -> Vec<PlannedChange> {
        let mut changes = self.changes.lock().clone();
        changes.sort_by(|a, b| a.task.cmp(&b.task));
        changes
    }

    /// Human-readable plan
    pub fn report(&self) -> String {
        let changes = self.changes();
        if changes.is_empty() {
            return "No changes planned\n".to_string();
        }

        let (updates, creates): (Vec<_>, Vec<_>) =
            changes.iter().partition(|change| change.existing.is_some());

        let mut out = String::new();
        for (title, section) in [("Will create resources:", creates), ("Will modify resources:", updates)] {
            if section.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(title);
            out.push('\n');
            for change in section {
                match &change.existing {
                    Some(id) => {
                        let _ = writeln!(out, "  {}\t{}", change.task, id);
                    }
                    None => {
                        let _ = writeln!(out, "  {}", change.task);
                    }
                }
                for (path, value) in &change.links {
                    let _ = writeln!(out, "    {path}\t{value}");
                }
            }
        }
        out
    }
}

#[async_trait]
impl Target for DryRunTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::DryRun
    }

    fn resolve_mode(&self) -> ResolveMode {
        ResolveMode::Placeholder
    }

    async fn begin(&self) -> Result<()> {
        self.changes.lock().clear();
        Ok(())
    }

    async fn render(&self, task: &dyn Task, ctx: &mut RenderContext) -> Result<()> {
        let mut recorder = LinkRecorder {
            ctx,
            links: Vec::new(),
            error: None,
        };
        task.visit_links(&mut recorder);
        if let Some(e) = recorder.error {
            return Err(e);
        }

        let change = PlannedChange {
            task: ctx.key().clone(),
            lifecycle: ctx.lifecycle(),
            existing: ctx.existing_id().map(str::to_string),
            links: recorder.links,
        };
        tracing::debug!(task = %change.task, links = change.links.len(), "Planned change");
        self.changes.lock().push(change);
        Ok(())
    }

    async fn finish(&self, _tasks: &TaskMap) -> Result<()> {
        let report = self.report();
        tracing::info!(changes = self.changes.lock().len(), "Dry run complete");

        if let Some(dir) = &self.report_dir {
            let path = dir.join(DRYRUN_REPORT_FILE);
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::file_system(dir, "create", e))?;
            tokio::fs::write(&path, report.as_bytes())
                .await
                .map_err(|e| Error::file_system(&path, "write", e))?;
        }
        Ok(())
    }
}
