//! Resolver and executor error types.

use std::path::PathBuf;

/// Errors produced while classifying a project or locating its output.
///
/// All of these are configuration errors: retrying will not help.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("working directory not found: {}", .0.display())]
    WorkDirMissing(PathBuf),

    #[error("working directory is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output not found in {}: searched {}", .work_dir.display(), .searched.join(", "))]
    OutputNotFound {
        work_dir: PathBuf,
        searched: Vec<String>,
    },
}

/// Errors produced by the build subprocess.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build {}", exit_description(.code))]
    Failed { code: Option<i32> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    }
}
