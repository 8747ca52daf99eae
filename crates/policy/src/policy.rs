//! Policy configuration and enforcement.

use crate::{CapabilityKind, CapabilityRequest, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Policy configuration loaded from TOML.
///
/// ```toml
/// deny = ["sql_write"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Capabilities that are refused outright.
    #[serde(default)]
    pub deny: BTreeSet<CapabilityKind>,
}

/// Result of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl Policy {
    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Allow every statement. This is the default.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Refuse anything SQLite does not consider read-only.
    pub fn read_only() -> Self {
        Self {
            deny: BTreeSet::from([CapabilityKind::SqlWrite]),
        }
    }

    /// Build a policy from a list of denied capability names.
    pub fn denying<I, S>(kinds: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let deny = kinds
            .into_iter()
            .map(|k| k.as_ref().parse())
            .collect::<Result<_>>()?;
        Ok(Self { deny })
    }

    /// Whether writes are refused.
    pub fn is_read_only(&self) -> bool {
        self.deny.contains(&CapabilityKind::SqlWrite)
    }

    /// Check if a capability request is allowed.
    pub fn check(&self, request: &CapabilityRequest) -> Decision {
        if self.deny.contains(&request.kind) {
            return Decision::Deny {
                reason: format!("{} is denied by policy", request.kind),
            };
        }
        Decision::Allow
    }
}
