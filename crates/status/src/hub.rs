//! [`EventHub`]-backed watcher sources.

use std::future::Future;
use std::pin::Pin;

use slipway_event_sink::EventHub;
use slipway_protocol::{DeploymentStatus, Event, ProjectId};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::error::WatchError;
use crate::watcher::{ArchiveSource, LiveSource, LiveStream, StatusPoller};

/// Serves polls from the hub's status board, live frames from its
/// broadcast channel, and replays from its archive.
#[derive(Clone)]
pub struct HubSource {
    hub: EventHub,
}

impl HubSource {
    pub fn new(hub: EventHub) -> Self {
        Self { hub }
    }
}

impl StatusPoller for HubSource {
    fn poll(
        &self,
        project: &ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DeploymentStatus>, WatchError>> + Send + '_>>
    {
        let status = self.hub.status(project);
        Box::pin(async move { Ok(status) })
    }
}

impl LiveSource for HubSource {
    fn open(
        &self,
        project: &ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LiveStream>, WatchError>> + Send + '_>> {
        let stream = HubStream {
            project: project.clone(),
            rx: Some(self.hub.subscribe(project)),
        };
        Box::pin(async move { Ok(Box::new(stream) as Box<dyn LiveStream>) })
    }
}

impl ArchiveSource for HubSource {
    fn replay(
        &self,
        project: &ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, WatchError>> + Send + '_>> {
        let result = self.hub.replay(project).map_err(WatchError::from);
        Box::pin(async move { result })
    }
}

/// Live frames from a hub subscription, serialized the way a push
/// transport would carry them.
struct HubStream {
    project: ProjectId,
    rx: Option<broadcast::Receiver<Event>>,
}

impl LiveStream for HubStream {
    fn next_frame(&mut self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let rx = self.rx.as_mut()?;
            loop {
                match rx.recv().await {
                    Ok(event) => return Some(event.to_json_line()),
                    Err(RecvError::Lagged(skipped)) => {
                        // The archive still has the skipped events.
                        warn!(project = %self.project, skipped, "live subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }

    fn close(&mut self) {
        self.rx = None;
    }
}
