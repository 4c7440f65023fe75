//! Task lifecycle markers
//!
//! A lifecycle decides whether the executor applies a task's changes, only
//! observes the resource, or leaves it entirely to someone else.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy controlling how the executor treats one task's resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Fully managed: render converges the resource, errors fail the task
    #[default]
    Sync,
    /// Unmanaged: never rendered, links resolve to the pre-existing identity
    Ignore,
    /// The resource must already exist and is still managed by this run
    ExistsAndManaged,
    /// The resource must already exist; drift is reported as a warning
    ExistsAndWarnIfChanges,
    /// The resource must already exist; permission failures are warnings
    ExistsAndWarnIfInsufficientAccess,
    /// Permission failures are reported as warnings
    WarnIfInsufficientAccess,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 6] = [
        Lifecycle::Sync,
        Lifecycle::Ignore,
        Lifecycle::ExistsAndManaged,
        Lifecycle::ExistsAndWarnIfChanges,
        Lifecycle::ExistsAndWarnIfInsufficientAccess,
        Lifecycle::WarnIfInsufficientAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Sync => "Sync",
            Lifecycle::Ignore => "Ignore",
            Lifecycle::ExistsAndManaged => "ExistsAndManaged",
            Lifecycle::ExistsAndWarnIfChanges => "ExistsAndWarnIfChanges",
            Lifecycle::ExistsAndWarnIfInsufficientAccess => "ExistsAndWarnIfInsufficientAccess",
            Lifecycle::WarnIfInsufficientAccess => "WarnIfInsufficientAccess",
        }
    }

    /// Whether the executor should call render at all
    pub fn is_rendered(&self) -> bool {
        !matches!(self, Lifecycle::Ignore)
    }

    /// Whether a render failure should be downgraded to a warning
    pub fn downgrades(&self, error: &Error) -> bool {
        match self {
            Lifecycle::ExistsAndWarnIfChanges => error.is_drift(),
            Lifecycle::ExistsAndWarnIfInsufficientAccess | Lifecycle::WarnIfInsufficientAccess => {
                error.is_access_denied()
            }
            Lifecycle::Sync | Lifecycle::Ignore | Lifecycle::ExistsAndManaged => false,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Lifecycle::ALL
            .into_iter()
            .find(|lifecycle| lifecycle.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::configuration(format!("unknown lifecycle '{s}'")))
    }
}
