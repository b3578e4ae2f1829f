//! Artifact discovery.
//!
//! Recursively walks an artifact root and yields one [`Artifact`] per
//! regular file, with keys relative to the root and normalized to forward
//! slashes. Symbolic links are followed; a link cycle surfaces as a
//! [`WalkError::Walk`]. Empty directories yield nothing.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::content_type::detect_content_type;
use crate::error::WalkError;

/// A single file to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub absolute_path: PathBuf,
    /// Path relative to the artifact root, `/`-separated, never empty.
    pub relative_key: String,
    pub content_type: String,
    pub size: u64,
}

type EntryFilter = Box<dyn FnMut(&DirEntry) -> bool + Send>;

/// Lazy iterator over the artifacts under a root.
///
/// Entries are visited in file-name order, so walking an unchanged tree
/// twice yields the same sequence.
pub struct ArtifactWalk {
    root: PathBuf,
    inner: walkdir::FilterEntry<walkdir::IntoIter, EntryFilter>,
}

/// Starts a walk of `root`, skipping directories named in `excluded` at
/// any depth.
///
/// Fails up front if `root` is missing or is not a directory.
pub fn walk_artifacts(root: &Path, excluded: &[String]) -> Result<ArtifactWalk, WalkError> {
    if !root.is_dir() {
        return Err(WalkError::OutputNotFound(root.to_path_buf()));
    }
    let root = std::path::absolute(root).map_err(|_| WalkError::OutputNotFound(root.to_path_buf()))?;

    let excluded = excluded.to_vec();
    let filter: EntryFilter = Box::new(move |entry| !is_excluded(entry, &excluded));

    let inner = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(filter);

    Ok(ArtifactWalk { root, inner })
}

impl ArtifactWalk {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact(&self, entry: &DirEntry) -> Result<Option<Artifact>, WalkError> {
        let rel_path = match entry.path().strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => return Ok(None),
        };

        // Normalize to forward slashes.
        let relative_key = rel_path.to_string_lossy().replace('\\', "/");
        if relative_key.is_empty() {
            return Ok(None);
        }

        let size = entry.metadata()?.len();

        Ok(Some(Artifact {
            absolute_path: entry.path().to_path_buf(),
            content_type: detect_content_type(entry.path()).to_string(),
            relative_key,
            size,
        }))
    }
}

impl Iterator for ArtifactWalk {
    type Item = Result<Artifact, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match self.artifact(&entry) {
                Ok(Some(artifact)) => return Some(Ok(artifact)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn is_excluded(entry: &DirEntry, excluded: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excluded.iter().any(|e| e == name))
}
