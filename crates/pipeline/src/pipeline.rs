//! Run orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use slipway_build::{BuildExecutor, ProjectKind, locate_output, resolve};
use slipway_event_sink::{EventHub, EventSink};
use slipway_protocol::{Level, ProjectId, StatusNotice};
use slipway_publish::{Artifact, ObjectStore, Publisher, walk_artifacts};
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub project_id: ProjectId,
    pub kind: ProjectKind,
    pub artifact_root: PathBuf,
    pub artifacts: usize,
    pub bytes: u64,
    /// Storage keys in upload order.
    pub keys: Vec<String>,
    pub dry_run: bool,
    pub duration: Duration,
}

/// Runs resolve, build, walk and publish for one source directory.
pub struct Pipeline {
    config: PipelineConfig,
    publisher: Publisher,
}

impl Pipeline {
    /// Creates a pipeline, choosing between real and simulated uploads from
    /// the storage settings.
    ///
    /// Missing credentials with dry-run forced off fail here, before any
    /// run starts.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let publisher = Publisher::from_config(&config.storage)?;
        Ok(Self { config, publisher })
    }

    /// Creates a pipeline that uploads to the given store.
    pub fn with_store(config: PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let publisher = Publisher::new(store).with_concurrency(config.storage.upload_concurrency);
        Self { config, publisher }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_dry_run(&self) -> bool {
        self.publisher.is_dry_run()
    }

    /// Starts a new run for `project` on the hub and executes it.
    pub async fn run(
        &self,
        hub: &EventHub,
        source_dir: &Path,
        project: &ProjectId,
    ) -> Result<RunSummary, PipelineError> {
        let sink = hub.start_run(project)?;
        self.execute(source_dir, &sink).await
    }

    /// Executes a run whose events go to `sink`.
    ///
    /// On failure the error is reported as one terminal `failed` event and
    /// returned. Artifacts uploaded before the failure stay in storage.
    pub async fn execute(
        &self,
        source_dir: &Path,
        sink: &EventSink,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let project = sink.project();
        sink.notify(StatusNotice::building());

        match self.phases(source_dir, sink, started).await {
            Ok(summary) => {
                info!(
                    project = %project,
                    run_id = %summary.run_id,
                    artifacts = summary.artifacts,
                    bytes = summary.bytes,
                    dry_run = summary.dry_run,
                    elapsed_ms = summary.duration.as_millis() as u64,
                    "deploy completed"
                );
                sink.notify(StatusNotice::finished(format!(
                    "published {} artifacts{}",
                    summary.artifacts,
                    if summary.dry_run { " (dry run)" } else { "" }
                )));
                Ok(summary)
            }
            Err(e) => {
                error!(project = %project, kind = %e.kind(), error = %e, "deploy failed");
                let mut notice =
                    StatusNotice::failed(e.to_string()).with_detail("kind", e.kind().as_str());
                if let Some(code) = e.exit_code() {
                    notice = notice.with_detail("code", code);
                }
                sink.notify(notice);
                Err(e)
            }
        }
    }

    async fn phases(
        &self,
        source_dir: &Path,
        sink: &EventSink,
        started: Instant,
    ) -> Result<RunSummary, PipelineError> {
        let build_config = &self.config.build;

        // 1. Resolve
        let resolution = resolve(source_dir, build_config)?;
        sink.emit_fields(
            Level::Info,
            &format!("detected {} project", resolution.kind.as_str()),
            &serde_json::json!({ "kind": resolution.kind.as_str() }),
        );

        // 2. Build
        let artifact_root = match &resolution.kind {
            ProjectKind::Static => resolution.work_dir.clone(),
            ProjectKind::Compiled { command } => {
                sink.info(format!("running build: {command}"));
                let outcome = BuildExecutor::new(build_config)
                    .execute(&resolution.work_dir, command, sink)
                    .await?;
                sink.info(format!(
                    "build succeeded in {:.1}s",
                    outcome.duration.as_secs_f64()
                ));
                locate_output(&resolution.work_dir, build_config)?
            }
        };

        // 3. Walk
        let artifacts: Vec<Artifact> =
            walk_artifacts(&artifact_root, &build_config.cache_dirs)?.collect::<Result<_, _>>()?;
        sink.emit_fields(
            Level::Info,
            &format!("found {} artifacts", artifacts.len()),
            &serde_json::json!({ "root": artifact_root.display().to_string() }),
        );

        // 4. Publish
        let report = self
            .publisher
            .publish(sink.project(), &artifacts, sink)
            .await?;

        Ok(RunSummary {
            run_id: sink.run_id().to_string(),
            project_id: sink.project().clone(),
            kind: resolution.kind,
            artifact_root,
            artifacts: report.artifacts,
            bytes: report.bytes,
            keys: report.keys,
            dry_run: report.dry_run,
            duration: started.elapsed(),
        })
    }
}
