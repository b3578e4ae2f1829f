//! Per-project live channels and status board.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use slipway_protocol::{DeploymentStatus, Event, ProjectId};
use tokio::sync::broadcast;

use crate::archive::{EventArchive, MemoryArchive};
use crate::error::ArchiveError;
use crate::sink::EventSink;

/// Default live channel capacity per project.
///
/// A subscriber that falls further behind than this misses events on the
/// live stream; the archive still has all of them.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Routes events for many projects.
///
/// Owns one broadcast channel per project for live observers, the last
/// known [`DeploymentStatus`] per project, and the shared archive.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    archive: Arc<dyn EventArchive>,
    channels: Mutex<HashMap<ProjectId, Channel>>,
    statuses: RwLock<HashMap<ProjectId, DeploymentStatus>>,
    capacity: usize,
}

/// A project's live channel and the number of runs emitting into it.
///
/// An entry with no runs and no subscribers is dropped.
struct Channel {
    tx: broadcast::Sender<Event>,
    runs: usize,
}

impl Channel {
    fn is_idle(&self) -> bool {
        self.runs == 0 && self.tx.receiver_count() == 0
    }
}

impl EventHub {
    /// Creates a hub backed by the given archive.
    pub fn new(archive: Arc<dyn EventArchive>) -> Self {
        Self::with_capacity(archive, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a hub with a custom live channel capacity.
    pub fn with_capacity(archive: Arc<dyn EventArchive>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                archive,
                channels: Mutex::new(HashMap::new()),
                statuses: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Creates a hub backed by a fresh [`MemoryArchive`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArchive::new()))
    }

    /// Starts a new run for a project and returns the sink producers emit into.
    ///
    /// The project is marked [`DeploymentStatus::Queued`] until the run
    /// reports otherwise.
    pub fn start_run(&self, project: &ProjectId) -> Result<EventSink, ArchiveError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.inner.archive.begin_run(project, &run_id, Utc::now())?;
        self.set_status(project, DeploymentStatus::Queued);
        tracing::debug!(project = %project, run_id = %run_id, "run started");
        Ok(EventSink::new(self.clone(), project.clone(), run_id))
    }

    /// Subscribes to the live event stream of a project.
    pub fn subscribe(&self, project: &ProjectId) -> broadcast::Receiver<Event> {
        self.sender(project).subscribe()
    }

    /// Number of live subscribers currently attached to a project.
    pub fn live_subscribers(&self, project: &ProjectId) -> usize {
        self.inner
            .channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(project).map(|ch| ch.tx.receiver_count()))
            .unwrap_or(0)
    }

    /// Last known status of a project, if any run was ever started.
    pub fn status(&self, project: &ProjectId) -> Option<DeploymentStatus> {
        self.inner
            .statuses
            .read()
            .ok()
            .and_then(|statuses| statuses.get(project).copied())
    }

    /// Events of the project's most recent run.
    pub fn replay(&self, project: &ProjectId) -> Result<Vec<Event>, ArchiveError> {
        self.inner.archive.latest(project)
    }

    /// The archive this hub writes to.
    pub fn archive(&self) -> &Arc<dyn EventArchive> {
        &self.inner.archive
    }

    pub(crate) fn set_status(&self, project: &ProjectId, status: DeploymentStatus) {
        if let Ok(mut statuses) = self.inner.statuses.write() {
            statuses.insert(project.clone(), status);
        }
    }

    /// Number of projects with a live channel.
    pub fn live_channels(&self) -> usize {
        self.inner
            .channels
            .lock()
            .map(|channels| channels.len())
            .unwrap_or(0)
    }

    fn sender(&self, project: &ProjectId) -> broadcast::Sender<Event> {
        self.channel(project, false)
    }

    /// Sender for a run's sink. Pair with [`EventHub::detach_run`].
    pub(crate) fn attach_run(&self, project: &ProjectId) -> broadcast::Sender<Event> {
        self.channel(project, true)
    }

    /// Marks a run finished and prunes channels nobody uses any more.
    pub(crate) fn detach_run(&self, project: &ProjectId) {
        if let Ok(mut channels) = self.inner.channels.lock() {
            if let Some(channel) = channels.get_mut(project) {
                channel.runs = channel.runs.saturating_sub(1);
            }
            channels.retain(|_, channel| !channel.is_idle());
        }
    }

    fn channel(&self, project: &ProjectId, run: bool) -> broadcast::Sender<Event> {
        let capacity = self.inner.capacity;
        match self.inner.channels.lock() {
            Ok(mut channels) => {
                let channel = channels.entry(project.clone()).or_insert_with(|| Channel {
                    tx: broadcast::channel(capacity).0,
                    runs: 0,
                });
                if run {
                    channel.runs += 1;
                }
                channel.tx.clone()
            }
            // A poisoned map still needs a usable sender; events on it are
            // only visible through the archive.
            Err(_) => broadcast::channel(capacity).0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_protocol::{Level, StatusNotice};

    fn project(id: &str) -> ProjectId {
        ProjectId::new(id).unwrap()
    }

    #[test]
    fn start_run_marks_queued() {
        let hub = EventHub::in_memory();
        let p = project("demo");
        assert_eq!(hub.status(&p), None);
        hub.start_run(&p).unwrap();
        assert_eq!(hub.status(&p), Some(DeploymentStatus::Queued));
    }

    #[test]
    fn status_events_update_board() {
        let hub = EventHub::in_memory();
        let p = project("demo");
        let sink = hub.start_run(&p).unwrap();

        sink.notify(StatusNotice::building());
        assert_eq!(hub.status(&p), Some(DeploymentStatus::Building));

        sink.notify(StatusNotice::finished("done"));
        assert_eq!(hub.status(&p), Some(DeploymentStatus::Finished));
    }

    #[test]
    fn projects_are_isolated() {
        let hub = EventHub::in_memory();
        let a = project("a");
        let b = project("b");
        let sink_a = hub.start_run(&a).unwrap();
        hub.start_run(&b).unwrap();

        sink_a.emit(Level::Info, "only a");

        assert_eq!(hub.replay(&a).unwrap().len(), 1);
        assert!(hub.replay(&b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let hub = EventHub::in_memory();
        let p = project("demo");
        let mut rx = hub.subscribe(&p);
        assert_eq!(hub.live_subscribers(&p), 1);

        let sink = hub.start_run(&p).unwrap();
        sink.emit(Level::Info, "first");
        sink.emit(Level::Warn, "second");

        assert_eq!(rx.recv().await.unwrap().message, "first");
        assert_eq!(rx.recv().await.unwrap().message, "second");
    }

    #[test]
    fn finished_runs_release_their_channel() {
        let hub = EventHub::in_memory();
        for id in ["a", "b", "c"] {
            let sink = hub.start_run(&project(id)).unwrap();
            sink.info("x");
        }
        assert_eq!(hub.live_channels(), 0);
    }

    #[tokio::test]
    async fn channel_kept_while_watched_or_running() {
        let hub = EventHub::in_memory();
        let p = project("demo");
        let mut rx = hub.subscribe(&p);

        let first = hub.start_run(&p).unwrap();
        let second = hub.start_run(&p).unwrap();
        drop(first);
        second.info("still live");
        assert_eq!(rx.recv().await.unwrap().message, "still live");

        drop(second);
        assert_eq!(hub.live_channels(), 1);

        drop(rx);
        hub.start_run(&project("other")).unwrap();
        assert_eq!(hub.live_channels(), 0);
    }

    #[test]
    fn live_subscribers_drop_to_zero() {
        let hub = EventHub::in_memory();
        let p = project("demo");
        let rx = hub.subscribe(&p);
        drop(rx);
        assert_eq!(hub.live_subscribers(&p), 0);
        assert_eq!(hub.live_subscribers(&project("other")), 0);
    }
}
