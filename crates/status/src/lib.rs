//! Deployment status tracking for observers.
//!
//! [`DeploymentModel`] is the state machine (`queued → building →
//! finished | failed`). [`StatusWatcher`] drives it from two racing
//! sources, a periodic status poll and a live event stream, and switches
//! the observer to archive replay once either reports a terminal status.

pub mod error;
pub mod hub;
pub mod model;
pub mod watcher;

pub use error::WatchError;
pub use hub::HubSource;
pub use model::{DeploymentModel, Transition};
pub use watcher::{
    ArchiveSource, DEFAULT_POLL_INTERVAL, LiveSource, LiveStream, StatusPoller, StatusWatcher,
    TerminalSignal, WatchOutcome, WatchUpdate,
};
