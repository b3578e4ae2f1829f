//! Watcher error types.

/// Errors produced while watching a deployment.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("status poll failed: {0}")]
    Poll(String),

    #[error("live stream unavailable: {0}")]
    Stream(String),

    #[error("archive error: {0}")]
    Archive(#[from] slipway_event_sink::ArchiveError),

    #[error("cancelled")]
    Cancelled,
}
