//! Publishing build output to object storage.
//!
//! The [`walker`] lists every file under an artifact root, [`keys`] maps
//! each one to its storage key, and the [`Publisher`] streams them to an
//! [`ObjectStore`], or only reports what it would upload in a dry run.

pub mod content_type;
pub mod error;
pub mod keys;
pub mod publisher;
pub mod storage;
pub mod walker;

pub use content_type::detect_content_type;
pub use error::{PublishError, StorageError, WalkError};
pub use keys::storage_key;
pub use publisher::{PublishReport, Publisher};
pub use storage::{HttpObjectStore, MemoryObjectStore, ObjectBody, ObjectStore, StorageConfig, StoredObject};
pub use walker::{Artifact, ArtifactWalk, walk_artifacts};
