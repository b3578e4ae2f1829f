//! Pipeline error types.

use slipway_build::{BuildError, ResolveError};
use slipway_event_sink::ArchiveError;
use slipway_publish::{PublishError, WalkError};

/// Failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Setup problems: missing directories, credentials or output.
    Configuration,
    /// The build subprocess failed.
    Build,
    /// An artifact upload failed.
    Transfer,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Build => "build",
            FailureKind::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Resolve(_) | PipelineError::Walk(_) | PipelineError::Archive(_) => {
                FailureKind::Configuration
            }
            PipelineError::Build(_) => FailureKind::Build,
            PipelineError::Publish(e) if e.is_configuration() => FailureKind::Configuration,
            PipelineError::Publish(_) => FailureKind::Transfer,
        }
    }

    /// Exit code of a failed build. `None` for other failures and for
    /// builds killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::Build(BuildError::Failed { code }) => *code,
            _ => None,
        }
    }
}
