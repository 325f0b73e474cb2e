use std::{io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Io,
    Protocol,
}

/// Failure raised inside the engine. Callers only ever see an error
/// envelope; the variant survives into the logs.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("i/o failure on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound(path.as_ref().display().to_string())
    }

    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        Self::AlreadyExists(path.as_ref().display().to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            EngineError::Io { .. } => ErrorKind::Io,
            EngineError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}
