//! Deciding whether a project needs compiling, and compiling it.
//!
//! # Flow
//!
//! 1. **Resolve**: inspect the working directory: a manifest declaring a
//!    build script makes the project *compiled*, anything else is *static*
//! 2. **Execute**: run the build command as a child process, relaying
//!    stdout/stderr line by line into the event sink
//! 3. **Locate**: find the artifact root among the conventional output
//!    directories

pub mod config;
pub mod error;
pub mod executor;
pub mod resolver;

pub use config::BuildConfig;
pub use error::{BuildError, ResolveError};
pub use executor::{BuildExecutor, BuildOutcome, OutputStream};
pub use resolver::{ProjectKind, Resolution, locate_output, resolve};
