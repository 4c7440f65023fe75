//! Deferred value resolution
//!
//! Completed tasks publish their outputs into an [`OutputStore`]. A
//! [`LinkResolver`] turns a link into a [`LinkValue`] by reading that store:
//! concrete targets need the real value, writer targets accept a symbolic
//! expression that the external tool evaluates later, and the dry-run target
//! accepts a placeholder.

use crate::definition::TaskKey;
use crate::link::{AnyLink, LinkRef};
use kforge_core::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The value a link resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LinkValue {
    /// A real value, e.g. `vpc-0a1b2c`
    Concrete(String),
    /// A Terraform expression without the `${}` wrapper, e.g. `aws_vpc.main.id`
    Terraform(String),
    /// A CloudFormation intrinsic, e.g. `{"Ref": "VPCmain"}`
    CloudFormation(serde_json::Value),
    /// Stands in for a value that only exists after apply
    Placeholder(LinkRef),
}

impl LinkValue {
    pub fn concrete(value: impl Into<String>) -> Self {
        LinkValue::Concrete(value.into())
    }

    /// `<type>.<name>.<attribute>`
    pub fn terraform_property(resource_type: &str, name: &str, attribute: &str) -> Self {
        LinkValue::Terraform(format!("{resource_type}.{name}.{attribute}"))
    }

    /// `{"Ref": "<logical id>"}`
    pub fn cloudformation_ref(logical_id: &str) -> Self {
        LinkValue::CloudFormation(serde_json::json!({ "Ref": logical_id }))
    }

    /// `{"Fn::GetAtt": ["<logical id>", "<attribute>"]}`
    pub fn cloudformation_attr(logical_id: &str, attribute: &str) -> Self {
        LinkValue::CloudFormation(serde_json::json!({ "Fn::GetAtt": [logical_id, attribute] }))
    }

    pub fn as_concrete(&self) -> Option<&str> {
        match self {
            LinkValue::Concrete(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, LinkValue::Concrete(_))
    }
}

impl fmt::Display for LinkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkValue::Concrete(value) => f.write_str(value),
            LinkValue::Terraform(expression) => write!(f, "${{{expression}}}"),
            LinkValue::CloudFormation(value) => write!(f, "{value}"),
            LinkValue::Placeholder(reference) => write!(f, "<{reference}>"),
        }
    }
}

/// Output fields a task published during render
pub type Outputs = BTreeMap<String, LinkValue>;

/// Outputs of every task that reached Done, frozen once recorded
#[derive(Debug, Default)]
pub struct OutputStore {
    entries: RwLock<BTreeMap<TaskKey, Arc<Outputs>>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task's outputs
    ///
    /// Returns `false` and keeps the first value if the task already has an
    /// entry; values never change once a task is done.
    pub fn freeze(&self, key: TaskKey, outputs: Outputs) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            tracing::warn!(task = %key, "Ignoring second output record for a done task");
            return false;
        }
        entries.insert(key, Arc::new(outputs));
        true
    }

    pub fn get(&self, key: &TaskKey) -> Option<Arc<Outputs>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// How links are read for the active target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Only real values; used when changes are applied directly
    Concrete,
    /// Terraform expressions allowed
    Terraform,
    /// CloudFormation intrinsics allowed
    CloudFormation,
    /// Anything goes; missing values become placeholders
    Placeholder,
}

/// Reads links against the outputs of completed tasks
#[derive(Debug, Clone)]
pub struct LinkResolver {
    store: Arc<OutputStore>,
    mode: ResolveMode,
}

impl LinkResolver {
    pub fn new(store: Arc<OutputStore>, mode: ResolveMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Resolve a link to the value appropriate for this mode
    ///
    /// Fails if the referenced task is not done yet. A concrete output is
    /// returned in every mode. Symbolic outputs are only accepted by the mode
    /// they belong to (or by placeholder mode). When the field was never
    /// published, writer modes fall back to the referenced task's own
    /// symbolic expression for that field.
    pub fn resolve(&self, link: &dyn AnyLink) -> Result<LinkValue> {
        let reference = link.reference();
        let Some(outputs) = self.store.get(&reference.task) else {
            return Err(Error::unresolved_link(
                reference.task.as_str(),
                &reference.field,
                "referenced task has not completed",
            ));
        };

        if let Some(value) = outputs.get(&reference.field) {
            return self.accept(&reference, value.clone());
        }

        match self.mode {
            ResolveMode::Placeholder => Ok(LinkValue::Placeholder(reference)),
            ResolveMode::Concrete => Err(Error::unresolved_link(
                reference.task.as_str(),
                &reference.field,
                "referenced task did not publish this field",
            )),
            ResolveMode::Terraform | ResolveMode::CloudFormation => self
                .symbolic(link)
                .ok_or_else(|| {
                    Error::unresolved_link(
                        reference.task.as_str(),
                        &reference.field,
                        "no value or symbolic expression available for this field",
                    )
                }),
        }
    }

    fn accept(&self, reference: &LinkRef, value: LinkValue) -> Result<LinkValue> {
        let accepted = match (&value, self.mode) {
            (LinkValue::Concrete(_), _) | (_, ResolveMode::Placeholder) => true,
            (LinkValue::Terraform(_), ResolveMode::Terraform) => true,
            (LinkValue::CloudFormation(_), ResolveMode::CloudFormation) => true,
            _ => false,
        };
        if accepted {
            Ok(value)
        } else {
            Err(Error::unresolved_link(
                reference.task.as_str(),
                &reference.field,
                format!("value '{value}' is symbolic and cannot be used here"),
            ))
        }
    }

    fn symbolic(&self, link: &dyn AnyLink) -> Option<LinkValue> {
        let task = link.target_task();
        match self.mode {
            ResolveMode::Terraform => task
                .as_terraform()
                .and_then(|render| render.terraform_link(link.field()))
                .map(LinkValue::Terraform),
            ResolveMode::CloudFormation => task
                .as_cloudformation()
                .and_then(|render| render.cloudformation_link(link.field()))
                .map(LinkValue::CloudFormation),
            ResolveMode::Concrete | ResolveMode::Placeholder => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Task;
    use crate::link::Link;
    use crate::target::{CloudFormationRender, CloudFormationWriter, TerraformRender, TerraformWriter};
    use crate::RenderContext;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Vpc;

    impl Task for Vpc {
        fn kind(&self) -> &str {
            "VPC"
        }
        fn name(&self) -> &str {
            "main"
        }
        fn as_terraform(&self) -> Option<&dyn TerraformRender> {
            Some(self)
        }
    }

    #[async_trait]
    impl TerraformRender for Vpc {
        async fn render_terraform(
            &self,
            _writer: &TerraformWriter,
            _ctx: &mut RenderContext,
        ) -> Result<()> {
            Ok(())
        }

        fn terraform_link(&self, field: &str) -> Option<String> {
            Some(format!("aws_vpc.main.{field}"))
        }
    }

    #[async_trait]
    impl CloudFormationRender for Vpc {
        async fn render_cloudformation(
            &self,
            _writer: &CloudFormationWriter,
            _ctx: &mut RenderContext,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn store_with(outputs: Outputs) -> Arc<OutputStore> {
        let store = Arc::new(OutputStore::new());
        store.freeze(TaskKey::new("VPC", "main"), outputs);
        store
    }

    #[test]
    fn test_unresolved_before_done() {
        let vpc = Arc::new(Vpc);
        let resolver = LinkResolver::new(Arc::new(OutputStore::new()), ResolveMode::Concrete);
        let err = resolver.resolve(&Link::to(&vpc)).unwrap_err();
        assert!(matches!(err, Error::UnresolvedLink { .. }));
    }

    #[test]
    fn test_concrete_value_in_every_mode() {
        let vpc = Arc::new(Vpc);
        let store = store_with(Outputs::from([(
            "id".to_string(),
            LinkValue::concrete("vpc-123"),
        )]));
        for mode in [
            ResolveMode::Concrete,
            ResolveMode::Terraform,
            ResolveMode::CloudFormation,
            ResolveMode::Placeholder,
        ] {
            let resolver = LinkResolver::new(store.clone(), mode);
            assert_eq!(
                resolver.resolve(&Link::to(&vpc)).unwrap(),
                LinkValue::concrete("vpc-123")
            );
        }
    }

    #[test]
    fn test_symbolic_value_rejected_in_concrete_mode() {
        let vpc = Arc::new(Vpc);
        let store = store_with(Outputs::from([(
            "id".to_string(),
            LinkValue::terraform_property("aws_vpc", "main", "id"),
        )]));

        let concrete = LinkResolver::new(store.clone(), ResolveMode::Concrete);
        assert!(concrete.resolve(&Link::to(&vpc)).is_err());

        let cfn = LinkResolver::new(store.clone(), ResolveMode::CloudFormation);
        assert!(cfn.resolve(&Link::to(&vpc)).is_err());

        let terraform = LinkResolver::new(store, ResolveMode::Terraform);
        assert_eq!(
            terraform.resolve(&Link::to(&vpc)).unwrap().to_string(),
            "${aws_vpc.main.id}"
        );
    }

    #[test]
    fn test_missing_field_falls_back_per_mode() {
        let vpc = Arc::new(Vpc);
        let store = store_with(Outputs::new());
        let link = Link::to_field(&vpc, "arn");

        let terraform = LinkResolver::new(store.clone(), ResolveMode::Terraform);
        assert_eq!(
            terraform.resolve(&link).unwrap(),
            LinkValue::Terraform("aws_vpc.main.arn".to_string())
        );

        // Vpc does not expose a CloudFormation renderer through `as_cloudformation`
        let cfn = LinkResolver::new(store.clone(), ResolveMode::CloudFormation);
        assert!(cfn.resolve(&link).is_err());

        let placeholder = LinkResolver::new(store.clone(), ResolveMode::Placeholder);
        assert_eq!(
            placeholder.resolve(&link).unwrap().to_string(),
            "<VPC/main.arn>"
        );

        let concrete = LinkResolver::new(store, ResolveMode::Concrete);
        assert!(concrete.resolve(&link).is_err());
    }

    #[test]
    fn test_outputs_are_frozen() {
        let store = OutputStore::new();
        let key = TaskKey::new("VPC", "main");
        assert!(store.freeze(
            key.clone(),
            Outputs::from([("id".to_string(), LinkValue::concrete("vpc-1"))])
        ));
        assert!(!store.freeze(
            key.clone(),
            Outputs::from([("id".to_string(), LinkValue::concrete("vpc-2"))])
        ));
        assert_eq!(
            store.get(&key).unwrap().get("id"),
            Some(&LinkValue::concrete("vpc-1"))
        );
    }

    #[test]
    fn test_cloudformation_helpers() {
        assert_eq!(
            LinkValue::cloudformation_ref("VPCmain").to_string(),
            r#"{"Ref":"VPCmain"}"#
        );
        assert_eq!(
            LinkValue::cloudformation_attr("VPCmain", "CidrBlock"),
            LinkValue::CloudFormation(serde_json::json!({"Fn::GetAtt": ["VPCmain", "CidrBlock"]}))
        );
    }
}
