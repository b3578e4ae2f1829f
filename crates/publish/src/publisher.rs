//! Artifact upload with progress events.
//!
//! Each artifact produces `uploading` then `uploaded` on the sink, or a
//! single `dry-run` event when uploads are simulated. Every event carries
//! the artifact's absolute `path` and its storage `key`. The first failing
//! upload aborts the publish: an `error` event naming the path is emitted
//! and the error is returned. Objects already uploaded are left in place.

use std::sync::Arc;

use futures_util::{TryStreamExt, stream};
use serde::Serialize;
use slipway_event_sink::EventSink;
use slipway_protocol::{Level, ProjectId};
use tracing::{debug, info};

use crate::error::PublishError;
use crate::keys::storage_key;
use crate::storage::{HttpObjectStore, ObjectStore, StorageConfig};
use crate::walker::Artifact;

/// Totals of a completed publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub artifacts: usize,
    pub bytes: u64,
    /// Storage keys in artifact order.
    pub keys: Vec<String>,
    pub dry_run: bool,
}

#[derive(Serialize)]
struct ArtifactFields<'a> {
    path: String,
    key: &'a str,
}

/// Uploads artifacts to an [`ObjectStore`].
pub struct Publisher {
    /// `None` simulates every upload.
    store: Option<Arc<dyn ObjectStore>>,
    concurrency: usize,
}

impl Publisher {
    /// A publisher that uploads to `store`, one artifact at a time.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store: Some(store),
            concurrency: 1,
        }
    }

    /// A publisher that never touches storage.
    pub fn dry_run() -> Self {
        Self {
            store: None,
            concurrency: 1,
        }
    }

    /// Builds a publisher from storage settings, choosing dry-run or HTTP.
    pub fn from_config(config: &StorageConfig) -> Result<Self, PublishError> {
        let publisher = if config.is_dry_run()? {
            Self::dry_run()
        } else {
            let store = HttpObjectStore::new(reqwest::Client::new(), config)?;
            Self::new(Arc::new(store))
        };
        Ok(publisher.with_concurrency(config.upload_concurrency))
    }

    /// Sets the maximum number of uploads in flight. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.store.is_none()
    }

    /// Publishes `artifacts` under the project's key namespace.
    pub async fn publish(
        &self,
        project: &ProjectId,
        artifacts: &[Artifact],
        sink: &EventSink,
    ) -> Result<PublishReport, PublishError> {
        let keys: Vec<String> = artifacts
            .iter()
            .map(|a| storage_key(project, &a.relative_key))
            .collect();

        info!(
            project = %project,
            artifacts = artifacts.len(),
            dry_run = self.is_dry_run(),
            concurrency = self.concurrency,
            "publishing artifacts"
        );

        match &self.store {
            None => {
                for (artifact, key) in artifacts.iter().zip(&keys) {
                    emit(sink, Level::Info, "dry-run", artifact, key);
                }
            }
            Some(store) => {
                let result = if self.concurrency == 1 {
                    self.upload_sequential(store.as_ref(), artifacts, &keys, sink)
                        .await
                } else {
                    stream::iter(artifacts.iter().zip(&keys).map(Ok))
                        .try_for_each_concurrent(self.concurrency, |(artifact, key)| {
                            upload_one(store.as_ref(), artifact, key, sink)
                        })
                        .await
                };

                if let Err(e) = result {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    sink.emit_fields(
                        Level::Error,
                        &e.to_string(),
                        &serde_json::json!({ "path": path }),
                    );
                    return Err(e);
                }
            }
        }

        Ok(PublishReport {
            artifacts: artifacts.len(),
            bytes: artifacts.iter().map(|a| a.size).sum(),
            keys,
            dry_run: self.is_dry_run(),
        })
    }

    async fn upload_sequential(
        &self,
        store: &dyn ObjectStore,
        artifacts: &[Artifact],
        keys: &[String],
        sink: &EventSink,
    ) -> Result<(), PublishError> {
        for (artifact, key) in artifacts.iter().zip(keys) {
            upload_one(store, artifact, key, sink).await?;
        }
        Ok(())
    }
}

async fn upload_one(
    store: &dyn ObjectStore,
    artifact: &Artifact,
    key: &str,
    sink: &EventSink,
) -> Result<(), PublishError> {
    emit(sink, Level::Info, "uploading", artifact, key);

    let file = tokio::fs::File::open(&artifact.absolute_path)
        .await
        .map_err(|source| PublishError::Read {
            path: artifact.absolute_path.clone(),
            source,
        })?;

    store
        .put(key, &artifact.content_type, artifact.size, Box::new(file))
        .await
        .map_err(|source| PublishError::Upload {
            path: artifact.absolute_path.clone(),
            key: key.to_string(),
            source,
        })?;

    debug!(key, bytes = artifact.size, "artifact uploaded");
    emit(sink, Level::Info, "uploaded", artifact, key);
    Ok(())
}

fn emit(sink: &EventSink, level: Level, message: &str, artifact: &Artifact, key: &str) {
    let fields = ArtifactFields {
        path: artifact.absolute_path.display().to_string(),
        key,
    };
    sink.emit_fields(level, message, &fields);
}
