//! Capability policy for SQL statements.
//!
//! Every statement the tool host runs is classified as a read or a write and
//! checked against a [`Policy`] before it is stepped. The default policy is
//! permissive: the host accepts any statement, including mutating ones.

mod capability;
mod error;
mod policy;

pub use capability::{CapabilityKind, CapabilityRequest};
pub use error::{Error, Result};
pub use policy::{Decision, Policy};
