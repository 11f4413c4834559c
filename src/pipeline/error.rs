use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Request-level failures. Everything else is folded into an `ExecutionOutcome`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("test generation failed: {0}")]
    Generation(#[source] anyhow::Error),
}

/// Filesystem failure while laying out a workspace.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale artifact {path}: {source}")]
    Purge {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StagingError {
    pub fn path(&self) -> &PathBuf {
        match self {
            StagingError::CreateDir { path, .. }
            | StagingError::Write { path, .. }
            | StagingError::Purge { path, .. } => path,
        }
    }
}
