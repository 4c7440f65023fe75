use super::{unsupported, Target};
use crate::definition::Task;
use crate::executor::RenderContext;
use crate::resolver::{LinkValue, ResolveMode};
use crate::task_map::TaskMap;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kforge_core::{Error, Result, TargetKind};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CLOUDFORMATION_TEMPLATE_FILE: &str = "kubernetes.json";

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Default)]
struct TemplateState {
    /// Logical id -> `{"Type": .., "Properties": ..}`
    resources: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
}

/// Accumulates CloudFormation resources while a run renders
#[derive(Debug, Default)]
pub struct CloudFormationWriter {
    state: Mutex<TemplateState>,
}

impl CloudFormationWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every resource and output
    pub fn clear(&self) {
        *self.state.lock() = TemplateState::default();
    }

    /// Logical id from a resource kind and name, alphanumerics only
    pub fn logical_id(kind: &str, name: &str) -> String {
        kind.chars()
            .chain(name.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect()
    }

    /// Convert a resolved link into a template value
    pub fn literal(value: &LinkValue) -> Result<Value> {
        match value {
            LinkValue::Concrete(value) => Ok(Value::String(value.clone())),
            LinkValue::CloudFormation(intrinsic) => Ok(intrinsic.clone()),
            other => Err(Error::cloud(
                "cloudformation render",
                format!("value '{other}' cannot be written to cloudformation"),
            )),
        }
    }

    /// Base64-encode `contents` for properties such as `UserData`
    pub fn base64_literal(contents: &[u8]) -> Value {
        Value::String(STANDARD.encode(contents))
    }

    /// Add a resource; logical ids must be unique
    pub fn render_resource(
        &self,
        logical_id: &str,
        resource_type: &str,
        properties: Value,
    ) -> Result<()> {
        if !properties.is_object() {
            return Err(Error::cloud(
                format!("cloudformation render {logical_id}"),
                "resource properties must be an object",
            ));
        }

        let mut state = self.state.lock();
        if state.resources.contains_key(logical_id) {
            return Err(Error::cloud(
                format!("cloudformation render {logical_id}"),
                "resource rendered twice",
            ));
        }
        state.resources.insert(
            logical_id.to_string(),
            json!({ "Type": resource_type, "Properties": properties }),
        );
        Ok(())
    }

    pub fn add_output(&self, name: &str, value: &LinkValue) -> Result<()> {
        let literal = Self::literal(value)?;
        self.state
            .lock()
            .outputs
            .insert(name.to_string(), json!({ "Value": literal }));
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<Value> {
        self.state.lock().resources.get(logical_id).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }

    /// The full template, pretty-printed with sorted keys
    pub fn render_template(&self) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            Value::String(TEMPLATE_FORMAT_VERSION.to_string()),
        );
        template.insert("Resources".to_string(), serde_json::to_value(&state.resources)?);
        if !state.outputs.is_empty() {
            template.insert("Outputs".to_string(), serde_json::to_value(&state.outputs)?);
        }

        let mut bytes = serde_json::to_vec_pretty(&Value::Object(template))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Emits a CloudFormation template instead of applying changes
#[derive(Debug)]
pub struct CloudFormationTarget {
    out_dir: PathBuf,
    writer: CloudFormationWriter,
}

impl CloudFormationTarget {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            writer: CloudFormationWriter::new(),
        }
    }

    pub fn writer(&self) -> &CloudFormationWriter {
        &self.writer
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn output_file(&self) -> PathBuf {
        self.out_dir.join(CLOUDFORMATION_TEMPLATE_FILE)
    }
}

#[async_trait]
impl Target for CloudFormationTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::CloudFormation
    }

    fn resolve_mode(&self) -> ResolveMode {
        ResolveMode::CloudFormation
    }

    async fn begin(&self) -> Result<()> {
        self.writer.clear();
        Ok(())
    }

    async fn render(&self, task: &dyn Task, ctx: &mut RenderContext) -> Result<()> {
        let render = task
            .as_cloudformation()
            .ok_or_else(|| unsupported(task, TargetKind::CloudFormation))?;
        render.render_cloudformation(&self.writer, ctx).await
    }

    async fn finish(&self, _tasks: &TaskMap) -> Result<()> {
        let contents = self.writer.render_template()?;
        let path = self.output_file();

        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| Error::file_system(&self.out_dir, "create", e))?;
        tokio::fs::write(&path, &contents)
            .await
            .map_err(|e| Error::file_system(&path, "write", e))?;

        tracing::info!(
            path = %path.display(),
            resources = self.writer.resource_count(),
            "CloudFormation template written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_id() {
        assert_eq!(
            CloudFormationWriter::logical_id("AWSEC2Subnet", "us-east-1a.k8s.local"),
            "AWSEC2Subnetuseast1ak8slocal"
        );
    }

    #[test]
    fn test_template_layout() {
        let writer = CloudFormationWriter::new();
        writer
            .render_resource(
                "AWSEC2VPCmain",
                "AWS::EC2::VPC",
                json!({ "CidrBlock": "10.0.0.0/16" }),
            )
            .unwrap();
        writer
            .render_resource(
                "AWSEC2Subneta",
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": CloudFormationWriter::literal(&LinkValue::cloudformation_ref("AWSEC2VPCmain")).unwrap(),
                    "UserData": CloudFormationWriter::base64_literal(b"hi"),
                }),
            )
            .unwrap();
        assert!(writer
            .render_resource("AWSEC2VPCmain", "AWS::EC2::VPC", json!({}))
            .is_err());

        let template: Value = serde_json::from_slice(&writer.render_template().unwrap()).unwrap();
        assert_eq!(
            template,
            json!({
                "AWSTemplateFormatVersion": "2010-09-09",
                "Resources": {
                    "AWSEC2Subneta": {
                        "Type": "AWS::EC2::Subnet",
                        "Properties": { "UserData": "aGk=", "VpcId": { "Ref": "AWSEC2VPCmain" } }
                    },
                    "AWSEC2VPCmain": {
                        "Type": "AWS::EC2::VPC",
                        "Properties": { "CidrBlock": "10.0.0.0/16" }
                    }
                }
            })
        );
    }

    #[test]
    fn test_terraform_values_rejected() {
        assert!(CloudFormationWriter::literal(&LinkValue::Terraform("aws_vpc.main.id".into())).is_err());
    }

    #[tokio::test]
    async fn test_finish_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let target = CloudFormationTarget::new(dir.path().join("cfn"));
        target.finish(&TaskMap::new()).await.unwrap();

        let written = std::fs::read(target.output_file()).unwrap();
        assert_eq!(written, target.writer().render_template().unwrap());
    }
}
