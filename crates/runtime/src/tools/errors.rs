use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
///
/// These are reported back to the model as failed tool results rather than
/// ending the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    /// The tool ran and failed; the text is passed on verbatim.
    #[error("{0}")]
    Execution(String),
    #[error("tool host unavailable: {0}")]
    Unavailable(String),
}
