use thiserror::Error;

/// A failed model call. The session abandons the turn on any of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never got an HTTP response.
    #[error("network: {0}")]
    Network(String),

    /// Non-success status, formatted as `<status>: <body>`.
    #[error("provider api: {0}")]
    Api(String),

    /// A success status whose body did not decode.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
