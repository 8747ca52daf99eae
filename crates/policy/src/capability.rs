use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Capability types that can be granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// A statement SQLite reports as read-only.
    SqlRead,
    /// Anything else: DML, DDL, pragmas with side effects, attach.
    SqlWrite,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlRead => "sql_read",
            Self::SqlWrite => "sql_write",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql_read" => Ok(Self::SqlRead),
            "sql_write" => Ok(Self::SqlWrite),
            other => Err(Error::UnknownCapability(other.to_string())),
        }
    }
}

/// A capability request with optional scope.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    pub kind: CapabilityKind,
    pub scope: Option<String>, // the statement text
}

impl CapabilityRequest {
    pub fn with_scope(kind: CapabilityKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: Some(scope.into()),
        }
    }

    pub fn sql_read(sql: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::SqlRead, sql)
    }

    pub fn sql_write(sql: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::SqlWrite, sql)
    }
}
