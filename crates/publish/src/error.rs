//! Publish error types.

use std::path::PathBuf;

/// Errors produced while walking an artifact root.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("output not found: {} is missing or not a directory", .0.display())]
    OutputNotFound(PathBuf),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Errors produced by an object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage returned status {status} for {key}")]
    Status { status: u16, key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage rejected {0}")]
    Rejected(String),

    #[error("{key}: expected {expected} bytes, read {actual}")]
    LengthMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },
}

/// Errors produced while publishing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("storage credentials are not configured and dry run is disabled")]
    MissingCredentials,

    #[error("storage endpoint is not configured")]
    MissingEndpoint,

    #[error("storage bucket is not configured")]
    MissingBucket,

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of {} failed: {source}", .path.display())]
    Upload {
        path: PathBuf,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PublishError {
    /// True for errors caused by missing or invalid storage settings.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PublishError::MissingCredentials
                | PublishError::MissingEndpoint
                | PublishError::MissingBucket
        )
    }

    /// The artifact that failed, if the error concerns one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            PublishError::Read { path, .. } | PublishError::Upload { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }
}
