use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    /// The model call failed; the turn is abandoned.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The model was still asking for tools when the round budget ran out.
    #[error("model still requesting tools after {limit} tool rounds")]
    ToolRoundsExceeded { limit: usize },

    /// The tool host could not be started or reached.
    #[error("tool host: {0}")]
    Mcp(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
