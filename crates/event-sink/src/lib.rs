//! Event sink and archive for build progress.
//!
//! Producers emit heterogeneous payloads through an [`EventSink`]; each one
//! is normalized into a [`slipway_protocol::Event`], appended to the
//! project's [`EventArchive`], and broadcast to live subscribers through
//! the [`EventHub`].

pub mod archive;
pub mod error;
pub mod hub;
pub mod sink;

pub use archive::{ArchivedRun, EventArchive, JsonLinesArchive, MemoryArchive};
pub use error::ArchiveError;
pub use hub::EventHub;
pub use sink::EventSink;
