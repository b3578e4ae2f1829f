//! Command implementations.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use slipway_event_sink::{EventArchive, EventHub, JsonLinesArchive};
use slipway_pipeline::Pipeline;
use slipway_protocol::{Event, ProjectId};
use slipway_status::DeploymentModel;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::Config;

/// Runs one pipeline, printing every event as a JSON line while it runs.
pub async fn deploy(config: &Config, dir: &Path, project: &ProjectId) -> anyhow::Result<()> {
    let archive = Arc::new(JsonLinesArchive::new(&config.archive_dir));
    let hub = EventHub::new(archive);
    let pipeline = Pipeline::new(config.pipeline())?;

    if pipeline.is_dry_run() {
        info!(project = %project, "no storage credentials in use, uploads are simulated");
    }

    let mut rx = hub.subscribe(project);
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind; see `slipway logs` for the full run");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = pipeline.run(&hub, dir, project).await;

    // Dropping the last hub handle closes the channel once the printer drains it.
    drop(hub);
    if let Err(e) = printer.await {
        warn!(error = %e, "event printer stopped");
    }

    let summary = result.with_context(|| format!("deploy of {project} failed"))?;
    info!(
        project = %summary.project_id,
        run_id = %summary.run_id,
        kind = summary.kind.as_str(),
        root = %summary.artifact_root.display(),
        artifacts = summary.artifacts,
        bytes = summary.bytes,
        dry_run = summary.dry_run,
        elapsed_ms = summary.duration.as_millis() as u64,
        "deploy finished"
    );
    Ok(())
}

/// Prints archived events of the latest run, or of every run.
pub fn logs(config: &Config, project: &ProjectId, all: bool) -> anyhow::Result<()> {
    let archive = JsonLinesArchive::new(&config.archive_dir);

    if all {
        let runs = archive.runs(project)?;
        if runs.is_empty() {
            anyhow::bail!("no runs recorded for {project}");
        }
        for run in runs {
            info!(run_id = %run.run_id, started_at = %run.started_at, events = run.events.len(), "run");
            run.events.iter().for_each(print_event);
        }
    } else {
        let events = archive.latest(project)?;
        if events.is_empty() {
            anyhow::bail!("no runs recorded for {project}");
        }
        events.iter().for_each(print_event);
    }

    Ok(())
}

/// Prints the status of the latest archived run.
pub fn status(config: &Config, project: &ProjectId) -> anyhow::Result<()> {
    let archive = JsonLinesArchive::new(&config.archive_dir);
    let events = archive.latest(project)?;
    if events.is_empty() {
        anyhow::bail!("no runs recorded for {project}");
    }

    let model = DeploymentModel::replay(&events);
    let last_message = events
        .iter()
        .rev()
        .find(|e| e.status().is_some())
        .map(|e| e.message.as_str())
        .unwrap_or("");

    println!(
        "{project}: {} ({:?} view) {last_message}",
        model.status(),
        model.view_mode()
    );
    Ok(())
}

fn print_event(event: &Event) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", event.to_json_line());
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_protocol::{DeploymentStatus, StatusNotice};

    fn config_in(dir: &Path) -> Config {
        Config {
            archive_dir: dir.join("runs"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn deploy_archives_run_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let site = tmp.path().join("site");
        std::fs::create_dir(&site).unwrap();
        std::fs::write(site.join("index.html"), "<html></html>").unwrap();
        let config = config_in(tmp.path());
        let project = ProjectId::new("cli-demo").unwrap();

        deploy(&config, &site, &project).await.unwrap();

        let archive = JsonLinesArchive::new(&config.archive_dir);
        let events = archive.latest(&project).unwrap();
        assert!(events.iter().any(|e| e.message == "dry-run"));
        assert_eq!(
            DeploymentModel::replay(&events).status(),
            DeploymentStatus::Finished
        );
    }

    #[tokio::test]
    async fn deploy_failure_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let project = ProjectId::new("cli-missing").unwrap();

        let err = deploy(&config, &tmp.path().join("nope"), &project)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cli-missing"));
    }

    #[test]
    fn status_and_logs_need_a_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let project = ProjectId::new("never").unwrap();

        assert!(status(&config, &project).is_err());
        assert!(logs(&config, &project, false).is_err());
        assert!(logs(&config, &project, true).is_err());
    }

    #[test]
    fn status_reads_latest_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let project = ProjectId::new("seen").unwrap();

        let hub = EventHub::new(Arc::new(JsonLinesArchive::new(&config.archive_dir)));
        let sink = hub.start_run(&project).unwrap();
        sink.notify(StatusNotice::building());
        sink.notify(StatusNotice::failed("boom"));
        drop(sink);

        status(&config, &project).unwrap();
        logs(&config, &project, true).unwrap();
    }
}
