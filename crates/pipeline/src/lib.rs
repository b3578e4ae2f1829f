//! Build-and-publish pipeline.
//!
//! A run moves through strictly ordered phases, all reporting through one
//! [`slipway_event_sink::EventSink`]:
//!
//! 1. **Resolve** the working directory as static or compiled
//! 2. **Build** compiled projects and locate their output directory
//! 3. **Walk** the artifact root
//! 4. **Publish** every artifact
//!
//! The run opens with a `building` status event and closes with exactly
//! one terminal `finished` or `failed` event.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{FailureKind, PipelineError};
pub use pipeline::{Pipeline, RunSummary};
