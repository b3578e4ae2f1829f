//! Replayable event storage keyed by project.
//!
//! Archived records use exactly the same shape as live events, so a client
//! can move from the live stream to replay without translating anything.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use slipway_protocol::{Event, ProjectId};

use crate::error::ArchiveError;

/// The events recorded for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

/// Persistent, append-only event storage.
///
/// Implementations must preserve insertion order per run.
pub trait EventArchive: Send + Sync {
    /// Opens a new run for a project. Later appends with this `run_id` go to it.
    fn begin_run(
        &self,
        project: &ProjectId,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), ArchiveError>;

    /// Appends one event to a run.
    fn append(&self, project: &ProjectId, run_id: &str, event: &Event) -> Result<(), ArchiveError>;

    /// Called once no producer will append to the run again.
    fn finish_run(&self, _project: &ProjectId, _run_id: &str) {}

    /// Every run of a project, oldest first.
    fn runs(&self, project: &ProjectId) -> Result<Vec<ArchivedRun>, ArchiveError>;

    /// Events of the most recent run, or an empty list if the project has none.
    fn latest(&self, project: &ProjectId) -> Result<Vec<Event>, ArchiveError> {
        Ok(self
            .runs(project)?
            .pop()
            .map(|run| run.events)
            .unwrap_or_default())
    }
}

/// In-process archive, used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    projects: Mutex<HashMap<ProjectId, Vec<ArchivedRun>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventArchive for MemoryArchive {
    fn begin_run(
        &self,
        project: &ProjectId,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), ArchiveError> {
        let mut projects = self.projects.lock().map_err(|_| ArchiveError::Poisoned)?;
        projects.entry(project.clone()).or_default().push(ArchivedRun {
            run_id: run_id.to_string(),
            started_at,
            events: Vec::new(),
        });
        Ok(())
    }

    fn append(&self, project: &ProjectId, run_id: &str, event: &Event) -> Result<(), ArchiveError> {
        let mut projects = self.projects.lock().map_err(|_| ArchiveError::Poisoned)?;
        let runs = projects.entry(project.clone()).or_default();

        match runs.iter_mut().rev().find(|r| r.run_id == run_id) {
            Some(run) => run.events.push(event.clone()),
            None => runs.push(ArchivedRun {
                run_id: run_id.to_string(),
                started_at: event.ts,
                events: vec![event.clone()],
            }),
        }
        Ok(())
    }

    fn runs(&self, project: &ProjectId) -> Result<Vec<ArchivedRun>, ArchiveError> {
        let projects = self.projects.lock().map_err(|_| ArchiveError::Poisoned)?;
        Ok(projects.get(project).cloned().unwrap_or_default())
    }
}

/// Archive that writes one JSON record per line.
///
/// Layout: `<dir>/<project>/<started_ms>-<seq>-<run_id>.jsonl`. The
/// zero-padded millisecond prefix keeps file names in start order; `seq`
/// orders runs started within the same millisecond.
pub struct JsonLinesArchive {
    dir: PathBuf,
    open: Mutex<HashMap<(ProjectId, String), File>>,
}

impl JsonLinesArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory of the archive.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.dir.join(project.as_str())
    }

    /// Creates the file of a new run.
    fn create_run(
        &self,
        project: &ProjectId,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<File, ArchiveError> {
        let dir = self.project_dir(project);
        std::fs::create_dir_all(&dir)?;

        let millis = started_at.timestamp_millis().max(0);
        let prefix = format!("{millis:013}-");
        let seq = list_runs(&dir)?
            .iter()
            .filter_map(|path| path.file_name()?.to_str()?.strip_prefix(&prefix)?.split_once('-'))
            .filter_map(|(seq, _)| seq.parse::<u32>().ok())
            .max()
            .map_or(0, |max| max + 1);

        let path = dir.join(format!("{prefix}{seq:04}-{run_id}.jsonl"));
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    /// Reopens an existing run, or creates it if it was never begun.
    fn reopen_run(&self, project: &ProjectId, run_id: &str, ts: DateTime<Utc>) -> Result<File, ArchiveError> {
        let dir = self.project_dir(project);
        let existing = if dir.is_dir() {
            list_runs(&dir)?
                .into_iter()
                .find(|path| parse_run_file_name(path).is_some_and(|(_, id)| id == run_id))
        } else {
            None
        };

        match existing {
            Some(path) => Ok(OpenOptions::new().append(true).open(path)?),
            None => self.create_run(project, run_id, ts),
        }
    }
}

impl EventArchive for JsonLinesArchive {
    fn begin_run(
        &self,
        project: &ProjectId,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), ArchiveError> {
        let mut open = self.open.lock().map_err(|_| ArchiveError::Poisoned)?;
        let file = self.create_run(project, run_id, started_at)?;
        open.insert((project.clone(), run_id.to_string()), file);
        tracing::debug!(project = %project, run_id, "archive run opened");
        Ok(())
    }

    fn append(&self, project: &ProjectId, run_id: &str, event: &Event) -> Result<(), ArchiveError> {
        let mut open = self.open.lock().map_err(|_| ArchiveError::Poisoned)?;
        let key = (project.clone(), run_id.to_string());

        if !open.contains_key(&key) {
            let file = self.reopen_run(project, run_id, event.ts)?;
            open.insert(key.clone(), file);
        }

        if let Some(file) = open.get_mut(&key) {
            let mut line = event.to_json_line();
            line.push('\n');
            // One write per record keeps concurrent appends from interleaving.
            file.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    fn finish_run(&self, project: &ProjectId, run_id: &str) {
        if let Ok(mut open) = self.open.lock() {
            open.remove(&(project.clone(), run_id.to_string()));
        }
    }

    fn runs(&self, project: &ProjectId) -> Result<Vec<ArchivedRun>, ArchiveError> {
        let dir = self.project_dir(project);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let files = list_runs(&dir)?;
        let mut runs = Vec::with_capacity(files.len());
        for path in files {
            let Some((started_at, run_id)) = parse_run_file_name(&path) else {
                tracing::warn!(path = %path.display(), "skipping unrecognized archive file");
                continue;
            };
            runs.push(ArchivedRun {
                run_id,
                started_at,
                events: read_events(&path)?,
            });
        }
        Ok(runs)
    }
}

/// Run files of a project directory, in start order.
fn list_runs(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

fn parse_run_file_name(path: &Path) -> Option<(DateTime<Utc>, String)> {
    let stem = path.file_stem()?.to_str()?;
    let (millis, rest) = stem.split_once('-')?;
    let (seq, run_id) = rest.split_once('-')?;
    seq.parse::<u32>().ok()?;
    let started_at = DateTime::from_timestamp_millis(millis.parse().ok()?)?;
    Some((started_at, run_id.to_string()))
}

/// Reads archived events, skipping lines that do not parse.
fn read_events(path: &Path) -> Result<Vec<Event>, ArchiveError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping malformed archived event"
                );
            }
        }
    }
    Ok(events)
}
