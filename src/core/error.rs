use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workspace is already being indexed: {}", workspace.display())]
    RebuildInProgress { workspace: PathBuf },

    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
