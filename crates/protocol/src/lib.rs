//! Wire types shared by every slipway component.
//!
//! The same [`Event`] record is used for live streaming and for archive
//! replay, so a consumer can switch between the two without translating.

pub mod event;
pub mod project;
pub mod status;

pub use event::{Event, Level, Payload};
pub use project::ProjectId;
pub use status::{DeploymentStatus, StatusNotice, ViewMode};

/// Errors produced by protocol-level validation.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid project id: {0}")]
    InvalidProjectId(String),
}
