//! Terraform writer target
//!
//! Renders collect resources, outputs and data files into a
//! [`TerraformWriter`]; `finish` serialises them as HCL2 (`kubernetes.tf`) or
//! Terraform JSON (`kubernetes.tf.json`) under the output directory. Every
//! map is ordered, so the same task map always produces the same bytes.

mod hcl;

use super::{unsupported, Target};
use crate::definition::Task;
use crate::executor::RenderContext;
use crate::resolver::{LinkValue, ResolveMode};
use crate::task_map::TaskMap;
use async_trait::async_trait;
use kforge_config::TerraformSettings;
use kforge_core::{Error, Result, TargetKind};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const TERRAFORM_HCL_FILE: &str = "kubernetes.tf";
pub const TERRAFORM_JSON_FILE: &str = "kubernetes.tf.json";
pub const TERRAFORM_DATA_DIR: &str = "data";

const REQUIRED_VERSION: &str = ">= 0.15.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraformFormat {
    Hcl,
    Json,
}

#[derive(Debug, Default)]
struct WriterState {
    /// type -> name -> body
    resources: BTreeMap<String, BTreeMap<String, Value>>,
    outputs: BTreeMap<String, Value>,
    /// Relative path -> contents
    files: BTreeMap<String, Vec<u8>>,
}

/// Accumulates Terraform resources while a run renders
#[derive(Debug, Default)]
pub struct TerraformWriter {
    state: Mutex<WriterState>,
}

impl TerraformWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every resource, output and file
    pub fn clear(&self) {
        *self.state.lock() = WriterState::default();
    }

    /// Terraform-safe resource name
    ///
    /// Characters outside `[A-Za-z0-9_-]` become `-`; a leading digit gets a
    /// `_` prefix.
    pub fn sanitize_name(name: &str) -> String {
        let mut sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        if sanitized.chars().next().map_or(true, |c| c.is_ascii_digit()) {
            sanitized.insert(0, '_');
        }
        sanitized
    }

    /// `<type>.<sanitized name>.<attribute>` as a link value
    pub fn reference(resource_type: &str, name: &str, attribute: &str) -> LinkValue {
        LinkValue::terraform_property(resource_type, &Self::sanitize_name(name), attribute)
    }

    /// Convert a resolved link into a value for a resource body
    pub fn literal(value: &LinkValue) -> Result<Value> {
        match value {
            LinkValue::Concrete(value) => Ok(Value::String(value.clone())),
            LinkValue::Terraform(expression) => Ok(Value::String(format!("${{{expression}}}"))),
            other => Err(Error::cloud(
                "terraform render",
                format!("value '{other}' cannot be written to terraform"),
            )),
        }
    }

    /// Add a resource; `(type, name)` must be unique
    pub fn render_resource(&self, resource_type: &str, name: &str, body: Value) -> Result<()> {
        if !body.is_object() {
            return Err(Error::cloud(
                format!("terraform render {resource_type}.{name}"),
                "resource body must be an object",
            ));
        }

        let name = Self::sanitize_name(name);
        let mut state = self.state.lock();
        let by_name = state.resources.entry(resource_type.to_string()).or_default();
        if by_name.contains_key(&name) {
            return Err(Error::cloud(
                format!("terraform render {resource_type}.{name}"),
                "resource rendered twice",
            ));
        }
        by_name.insert(name, body);
        Ok(())
    }

    /// Add an `output` block; re-adding the same value is a no-op
    pub fn add_output(&self, name: &str, value: &LinkValue) -> Result<()> {
        let literal = Self::literal(value)?;
        let mut state = self.state.lock();
        match state.outputs.get(name) {
            Some(existing) if *existing != literal => Err(Error::cloud(
                format!("terraform output {name}"),
                "output defined with conflicting values",
            )),
            Some(_) => Ok(()),
            None => {
                state.outputs.insert(name.to_string(), literal);
                Ok(())
            }
        }
    }

    /// Store file contents under `data/` and return the expression reading it
    ///
    /// With `base64` the expression uses `filebase64` instead of `file`.
    pub fn add_file_bytes(
        &self,
        resource_type: &str,
        name: &str,
        key: &str,
        contents: &[u8],
        base64: bool,
    ) -> LinkValue {
        let file_name = format!("{resource_type}_{}_{key}", Self::sanitize_name(name));
        let relative = format!("{TERRAFORM_DATA_DIR}/{file_name}");
        self.state.lock().files.insert(relative.clone(), contents.to_vec());

        let function = if base64 { "filebase64" } else { "file" };
        LinkValue::Terraform(format!("{function}(\"${{path.module}}/{relative}\")"))
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.values().map(BTreeMap::len).sum()
    }

    pub fn resource(&self, resource_type: &str, name: &str) -> Option<Value> {
        self.state
            .lock()
            .resources
            .get(resource_type)
            .and_then(|by_name| by_name.get(&Self::sanitize_name(name)))
            .cloned()
    }

    fn provider_block(settings: &TerraformSettings) -> Option<(String, Map<String, Value>)> {
        let provider = settings.provider.as_ref()?;
        let mut body = Map::new();
        if let Some(region) = &settings.region {
            body.insert("region".to_string(), Value::String(region.clone()));
        }
        for (key, value) in &settings.provider_extra_config {
            body.insert(key.clone(), Value::String(value.clone()));
        }
        Some((provider.clone(), body))
    }

    /// Terraform JSON document
    pub fn render_json(&self, settings: &TerraformSettings) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let mut root = Map::new();

        if let Some((provider, body)) = Self::provider_block(settings) {
            root.insert("provider".to_string(), json!({ provider: body }));
        }
        if !state.resources.is_empty() {
            root.insert("resource".to_string(), serde_json::to_value(&state.resources)?);
        }
        if !state.outputs.is_empty() {
            let outputs: Map<String, Value> = state
                .outputs
                .iter()
                .map(|(name, value)| (name.clone(), json!({ "value": value })))
                .collect();
            root.insert("output".to_string(), Value::Object(outputs));
        }
        root.insert(
            "terraform".to_string(),
            json!({ "required_version": REQUIRED_VERSION }),
        );

        let mut bytes = serde_json::to_vec_pretty(&Value::Object(root))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// HCL2 document
    pub fn render_hcl(&self, settings: &TerraformSettings) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let mut blocks = Vec::new();

        if let Some((provider, body)) = Self::provider_block(settings) {
            blocks.push(hcl::block("provider", &[provider.as_str()], &body));
        }
        for (resource_type, by_name) in &state.resources {
            for (name, body) in by_name {
                let body = body.as_object().cloned().unwrap_or_default();
                blocks.push(hcl::block("resource", &[resource_type.as_str(), name.as_str()], &body));
            }
        }
        for (name, value) in &state.outputs {
            let mut body = Map::new();
            body.insert("value".to_string(), value.clone());
            blocks.push(hcl::block("output", &[name.as_str()], &body));
        }
        let mut terraform = Map::new();
        terraform.insert(
            "required_version".to_string(),
            Value::String(REQUIRED_VERSION.to_string()),
        );
        blocks.push(hcl::block("terraform", &[], &terraform));

        Ok(blocks.join("\n").into_bytes())
    }

    fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.state.lock().files.clone()
    }
}

/// Emits Terraform instead of applying changes
#[derive(Debug)]
pub struct TerraformTarget {
    format: TerraformFormat,
    out_dir: PathBuf,
    settings: TerraformSettings,
    writer: TerraformWriter,
}

impl TerraformTarget {
    pub fn new(
        format: TerraformFormat,
        out_dir: impl Into<PathBuf>,
        settings: TerraformSettings,
    ) -> Self {
        Self {
            format,
            out_dir: out_dir.into(),
            settings,
            writer: TerraformWriter::new(),
        }
    }

    pub fn writer(&self) -> &TerraformWriter {
        &self.writer
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Path of the main document written by `finish`
    pub fn output_file(&self) -> PathBuf {
        match self.format {
            TerraformFormat::Hcl => self.out_dir.join(TERRAFORM_HCL_FILE),
            TerraformFormat::Json => self.out_dir.join(TERRAFORM_JSON_FILE),
        }
    }

    /// Contents of the main document
    pub fn render_output(&self) -> Result<Vec<u8>> {
        match self.format {
            TerraformFormat::Hcl => self.writer.render_hcl(&self.settings),
            TerraformFormat::Json => self.writer.render_json(&self.settings),
        }
    }
}

#[async_trait]
impl Target for TerraformTarget {
    fn kind(&self) -> TargetKind {
        match self.format {
            TerraformFormat::Hcl => TargetKind::Terraform,
            TerraformFormat::Json => TargetKind::TerraformJson,
        }
    }

    fn resolve_mode(&self) -> ResolveMode {
        ResolveMode::Terraform
    }

    async fn begin(&self) -> Result<()> {
        self.writer.clear();
        Ok(())
    }

    async fn render(&self, task: &dyn Task, ctx: &mut RenderContext) -> Result<()> {
        let render = task
            .as_terraform()
            .ok_or_else(|| unsupported(task, self.kind()))?;
        render.render_terraform(&self.writer, ctx).await
    }

    async fn finish(&self, _tasks: &TaskMap) -> Result<()> {
        let contents = self.render_output()?;
        let main_file = self.output_file();

        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| Error::file_system(&self.out_dir, "create", e))?;
        tokio::fs::write(&main_file, &contents)
            .await
            .map_err(|e| Error::file_system(&main_file, "write", e))?;

        for (relative, data) in self.writer.files() {
            let path = self.out_dir.join(&relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::file_system(parent, "create", e))?;
            }
            tokio::fs::write(&path, &data)
                .await
                .map_err(|e| Error::file_system(&path, "write", e))?;
        }

        tracing::info!(
            out_dir = %self.out_dir.display(),
            resources = self.writer.resource_count(),
            "Terraform output written"
        );
        Ok(())
    }
}
