//! Shared value types used across the workspace

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The backend a run dispatches task renders against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetKind {
    /// Apply changes directly through the cloud API
    #[default]
    #[serde(rename = "direct")]
    Direct,
    /// Emit Terraform HCL2
    #[serde(rename = "terraform")]
    Terraform,
    /// Emit Terraform JSON
    #[serde(rename = "terraform-json")]
    TerraformJson,
    /// Emit a CloudFormation template
    #[serde(rename = "cloudformation")]
    CloudFormation,
    /// Plan only, no side effects
    #[serde(rename = "dryrun")]
    DryRun,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Direct => "direct",
            TargetKind::Terraform => "terraform",
            TargetKind::TerraformJson => "terraform-json",
            TargetKind::CloudFormation => "cloudformation",
            TargetKind::DryRun => "dryrun",
        }
    }

    /// Writer targets emit symbolic references instead of concrete values
    pub fn is_writer(&self) -> bool {
        matches!(
            self,
            TargetKind::Terraform | TargetKind::TerraformJson | TargetKind::CloudFormation
        )
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(TargetKind::Direct),
            "terraform" => Ok(TargetKind::Terraform),
            "terraform-json" => Ok(TargetKind::TerraformJson),
            "cloudformation" => Ok(TargetKind::CloudFormation),
            "dryrun" => Ok(TargetKind::DryRun),
            other => Err(Error::configuration(format!("unknown target '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("terraform-json".parse::<TargetKind>().unwrap(), TargetKind::TerraformJson);
        assert_eq!("DryRun".parse::<TargetKind>().unwrap(), TargetKind::DryRun);
        assert!("pulumi".parse::<TargetKind>().is_err());
        assert!(TargetKind::CloudFormation.is_writer());
        assert!(!TargetKind::DryRun.is_writer());
    }
}
