//! Live/archive observation of a deployment.
//!
//! An observer attaches with one status poll. A run that is already
//! terminal goes straight to archive replay and no stream is opened.
//! Otherwise a live stream is opened and raced against a periodic poll;
//! the first terminal status from either source wins, after which the
//! stream is closed, polling stops, and the archive is replayed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use slipway_protocol::{DeploymentStatus, Event, ProjectId, ViewMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WatchError;
use crate::model::{DeploymentModel, Transition};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Reads the current status projection of a project.
pub trait StatusPoller: Send + Sync {
    fn poll(
        &self,
        project: &ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DeploymentStatus>, WatchError>> + Send + '_>>;
}

/// Opens push-based event streams.
pub trait LiveSource: Send + Sync {
    fn open(
        &self,
        project: &ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LiveStream>, WatchError>> + Send + '_>>;
}

/// One open live stream delivering raw JSON event frames.
pub trait LiveStream: Send {
    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;

    /// Releases the underlying subscription.
    fn close(&mut self);
}

/// Returns the archived events of a project's most recent run.
pub trait ArchiveSource: Send + Sync {
    fn replay(
        &self,
        project: &ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, WatchError>> + Send + '_>>;
}

/// Which source reported the terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSignal {
    /// The run was already terminal when the observer attached.
    Attach,
    Poll,
    Stream,
}

/// Progress reported to the observer while watching.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate {
    Attached {
        status: DeploymentStatus,
        mode: ViewMode,
    },
    /// An event received on the live stream.
    Live(Event),
    StatusChanged {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
    /// The archived events, delivered once the run is terminal.
    Archive(Vec<Event>),
}

/// Final state of a watch.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOutcome {
    pub status: DeploymentStatus,
    pub signal: TerminalSignal,
    pub live_events: usize,
    pub archive: Vec<Event>,
}

/// Drives a [`DeploymentModel`] from a poller and a live stream.
pub struct StatusWatcher {
    poller: Arc<dyn StatusPoller>,
    live: Arc<dyn LiveSource>,
    archive: Arc<dyn ArchiveSource>,
    poll_interval: Duration,
}

impl StatusWatcher {
    pub fn new(
        poller: Arc<dyn StatusPoller>,
        live: Arc<dyn LiveSource>,
        archive: Arc<dyn ArchiveSource>,
    ) -> Self {
        Self {
            poller,
            live,
            archive,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the poll period. Values below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Watches `project` until its run is terminal, then replays the archive.
    ///
    /// Updates are offered on `updates_tx` without waiting: when the channel
    /// is full the update is dropped with a warning, and a dropped receiver
    /// is ignored. The returned [`WatchOutcome`] always carries the final
    /// status and archive. Cancelling `cancel` closes the stream and returns
    /// [`WatchError::Cancelled`].
    ///
    /// A live stream that cannot be opened is not fatal: the watch continues
    /// on polls alone.
    pub async fn watch(
        &self,
        project: &ProjectId,
        updates_tx: &mpsc::Sender<WatchUpdate>,
        cancel: CancellationToken,
    ) -> Result<WatchOutcome, WatchError> {
        let initial = self.poller.poll(project).await?;
        let mut model = DeploymentModel::from_status(initial.unwrap_or(DeploymentStatus::Queued));

        offer(
            updates_tx,
            WatchUpdate::Attached {
                status: model.status(),
                mode: model.view_mode(),
            },
        );

        if model.is_terminal() {
            debug!(project = %project, status = %model.status(), "already terminal, replaying archive");
            return self
                .finish(project, model, TerminalSignal::Attach, 0, updates_tx)
                .await;
        }

        let (mut stream, stream_open) = match self.live.open(project).await {
            Ok(stream) => (stream, true),
            Err(e) => {
                warn!(project = %project, error = %e, "live stream unavailable, watching by polls only");
                (Box::new(Detached) as Box<dyn LiveStream>, false)
            }
        };
        let (signal, live_events) = self
            .race(
                project,
                &mut model,
                stream.as_mut(),
                stream_open,
                updates_tx,
                &cancel,
            )
            .await;
        stream.close();
        drop(stream);

        let signal = signal?;
        info!(project = %project, status = %model.status(), ?signal, "deployment reached terminal state");
        self.finish(project, model, signal, live_events, updates_tx)
            .await
    }

    /// Consumes both sources until one reports a terminal status.
    async fn race(
        &self,
        project: &ProjectId,
        model: &mut DeploymentModel,
        stream: &mut dyn LiveStream,
        mut stream_open: bool,
        updates_tx: &mpsc::Sender<WatchUpdate>,
        cancel: &CancellationToken,
    ) -> (Result<TerminalSignal, WatchError>, usize) {
        let mut poll_interval = tokio::time::interval(self.poll_interval);
        poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the attach poll covered it.
        poll_interval.tick().await;

        let mut live_events = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return (Err(WatchError::Cancelled), live_events),
                frame = stream.next_frame(), if stream_open => {
                    let Some(raw) = frame else {
                        debug!(project = %project, "live stream ended, continuing with polls");
                        stream_open = false;
                        continue;
                    };

                    let event: Event = match serde_json::from_str(&raw) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(project = %project, error = %e, "skipping malformed live frame");
                            continue;
                        }
                    };

                    live_events += 1;
                    let status = event.status();
                    offer(updates_tx, WatchUpdate::Live(event));

                    if let Some(status) = status
                        && apply(model, status, updates_tx)
                    {
                        return (Ok(TerminalSignal::Stream), live_events);
                    }
                }
                _ = poll_interval.tick() => {
                    match self.poller.poll(project).await {
                        Ok(Some(status)) => {
                            if apply(model, status, updates_tx) {
                                return (Ok(TerminalSignal::Poll), live_events);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(project = %project, error = %e, "status poll failed"),
                    }
                }
            }
        }
    }

    async fn finish(
        &self,
        project: &ProjectId,
        model: DeploymentModel,
        signal: TerminalSignal,
        live_events: usize,
        updates_tx: &mpsc::Sender<WatchUpdate>,
    ) -> Result<WatchOutcome, WatchError> {
        let archive = self.archive.replay(project).await?;
        offer(updates_tx, WatchUpdate::Archive(archive.clone()));

        Ok(WatchOutcome {
            status: model.status(),
            signal,
            live_events,
            archive,
        })
    }
}

/// Feeds a status into the model; returns true if it became terminal.
fn apply(
    model: &mut DeploymentModel,
    status: DeploymentStatus,
    updates_tx: &mpsc::Sender<WatchUpdate>,
) -> bool {
    match model.apply(status) {
        transition @ Transition::Advanced { from, to } => {
            offer(updates_tx, WatchUpdate::StatusChanged { from, to });
            transition.is_terminal()
        }
        Transition::Unchanged => false,
        Transition::Ignored { current, requested } => {
            debug!(%current, %requested, "ignoring stale status");
            false
        }
    }
}

/// Hands an update to the observer without blocking the watch.
fn offer(updates_tx: &mpsc::Sender<WatchUpdate>, update: WatchUpdate) {
    match updates_tx.try_send(update) {
        Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("watch update channel full, dropping update");
        }
    }
}

/// Stand-in when no live stream could be opened.
struct Detached;

impl LiveStream for Detached {
    fn next_frame(&mut self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async { None })
    }

    fn close(&mut self) {}
}
