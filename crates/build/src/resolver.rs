//! Output resolution.
//!
//! Pure filesystem inspection: nothing here writes or spawns.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::BuildConfig;
use crate::error::ResolveError;

/// Whether a project must be compiled before publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKind {
    /// Ship the working directory as-is.
    Static,
    /// Run `command`, then publish the located output directory.
    Compiled { command: String },
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Static => "static",
            ProjectKind::Compiled { .. } => "compiled",
        }
    }
}

/// Result of inspecting a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub work_dir: PathBuf,
    pub kind: ProjectKind,
}

impl Resolution {
    /// The artifact root, when it is known without building.
    pub fn static_root(&self) -> Option<&Path> {
        match self.kind {
            ProjectKind::Static => Some(self.work_dir.as_path()),
            ProjectKind::Compiled { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    scripts: serde_json::Map<String, serde_json::Value>,
}

/// Classifies the project in `work_dir`.
///
/// A manifest whose `scripts` table declares a non-empty build script makes
/// the project compiled. A missing manifest or missing script means static.
pub fn resolve(work_dir: &Path, config: &BuildConfig) -> Result<Resolution, ResolveError> {
    if !work_dir.exists() {
        return Err(ResolveError::WorkDirMissing(work_dir.to_path_buf()));
    }
    if !work_dir.is_dir() {
        return Err(ResolveError::NotADirectory(work_dir.to_path_buf()));
    }

    let manifest_path = work_dir.join(&config.manifest);
    let kind = if declares_build(&manifest_path, &config.build_script)? {
        ProjectKind::Compiled {
            command: config.build_command(),
        }
    } else {
        ProjectKind::Static
    };

    tracing::debug!(
        work_dir = %work_dir.display(),
        kind = kind.as_str(),
        "project resolved"
    );

    Ok(Resolution {
        work_dir: work_dir.to_path_buf(),
        kind,
    })
}

/// Finds the artifact root of a compiled project after its build succeeded.
///
/// Returns the first existing directory among `config.output_dirs`.
pub fn locate_output(work_dir: &Path, config: &BuildConfig) -> Result<PathBuf, ResolveError> {
    config
        .output_dirs
        .iter()
        .map(|name| work_dir.join(name))
        .find(|candidate| candidate.is_dir())
        .ok_or_else(|| ResolveError::OutputNotFound {
            work_dir: work_dir.to_path_buf(),
            searched: config.output_dirs.clone(),
        })
}

fn declares_build(manifest_path: &Path, script: &str) -> Result<bool, ResolveError> {
    if !manifest_path.is_file() {
        return Ok(false);
    }

    let content = std::fs::read_to_string(manifest_path)?;
    let manifest: Manifest =
        serde_json::from_str(&content).map_err(|source| ResolveError::Manifest {
            path: manifest_path.to_path_buf(),
            source,
        })?;

    Ok(manifest
        .scripts
        .get(script)
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.trim().is_empty()))
}
