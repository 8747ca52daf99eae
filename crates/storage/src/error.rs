use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Database(#[from] rusqlite::Error),

    #[error("database not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("{0}")]
    Statement(String),

    #[error("{0}")]
    Denied(String),
}

pub type Result<T> = std::result::Result<T, Error>;
