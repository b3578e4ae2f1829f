//! End-to-end runs against an in-memory hub and object store.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use slipway_event_sink::EventHub;
use slipway_pipeline::{FailureKind, Pipeline, PipelineConfig};
use slipway_protocol::{DeploymentStatus, Event, Level, ProjectId, StatusNotice, ViewMode};
use slipway_publish::MemoryObjectStore;
use slipway_status::{HubSource, StatusWatcher, TerminalSignal, WatchUpdate};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn project(id: &str) -> ProjectId {
    ProjectId::new(id).unwrap()
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

fn compiled_config(command: &str) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.build.command = Some(command.into());
    config
}

fn messages(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.message.as_str()).collect()
}

#[tokio::test]
async fn static_project_publishes_working_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", "<html></html>");
    write(dir.path(), "assets/app.js", "console.log('hi')");

    let hub = EventHub::in_memory();
    let store = Arc::new(MemoryObjectStore::new());
    // A shell that cannot exist: any build attempt would fail the run.
    let mut config = PipelineConfig::default();
    config.build.shell = Some("/nonexistent/shell".into());
    let pipeline = Pipeline::with_store(config, store.clone());

    let summary = pipeline
        .run(&hub, dir.path(), &project("demo1"))
        .await
        .unwrap();

    assert_eq!(summary.artifact_root, dir.path());
    let mut keys = store.keys();
    keys.sort();
    assert_eq!(
        keys,
        vec!["__outputs/demo1/assets/app.js", "__outputs/demo1/index.html"]
    );

    let events = hub.replay(&project("demo1")).unwrap();
    assert!(events.iter().all(|e| e.get_str("stream").is_none()));
    assert_eq!(events.last().unwrap().status(), Some(DeploymentStatus::Finished));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_build_reports_stderr_then_terminal_failure() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "package.json", r#"{"scripts": {"build": "webpack"}}"#);
    write(dir.path(), "dist/stale.js", "old output");

    let hub = EventHub::in_memory();
    let store = Arc::new(MemoryObjectStore::new());
    let pipeline = Pipeline::with_store(
        compiled_config("echo 'syntax error' >&2; exit 1"),
        store.clone(),
    );

    let err = pipeline
        .run(&hub, dir.path(), &project("demo2"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Build);
    assert!(store.objects().is_empty());

    let events = hub.replay(&project("demo2")).unwrap();
    let stderr_pos = events
        .iter()
        .position(|e| e.level == Level::Error && e.message.contains("syntax error"))
        .unwrap();
    let terminal = events.last().unwrap();
    assert!(stderr_pos < events.len() - 1);
    assert_eq!(terminal.status(), Some(DeploymentStatus::Failed));
    assert_eq!(terminal.level, Level::Error);
    assert!(terminal.message.contains("code 1"));
    assert_eq!(terminal.get_str("kind"), Some("build"));
    assert_eq!(terminal.get("code").and_then(|c| c.as_i64()), Some(1));
    assert!(!messages(&events).contains(&"uploading"));
    assert_eq!(hub.status(&project("demo2")), Some(DeploymentStatus::Failed));
}

#[cfg(unix)]
#[tokio::test]
async fn compiled_project_publishes_dist() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "package.json", r#"{"scripts": {"build": "vite build"}}"#);
    write(dir.path(), "src/main.ts", "export {}");

    let hub = EventHub::in_memory();
    let store = Arc::new(MemoryObjectStore::new());
    let pipeline = Pipeline::with_store(
        compiled_config("mkdir -p dist && printf 'console.log(1)' > dist/main.js"),
        store.clone(),
    );

    let summary = pipeline
        .run(&hub, dir.path(), &project("demo2"))
        .await
        .unwrap();

    assert_eq!(summary.artifact_root, dir.path().join("dist"));
    assert_eq!(store.keys(), vec!["__outputs/demo2/main.js"]);
    assert_eq!(store.objects()[0].body, b"console.log(1)");

    let events = hub.replay(&project("demo2")).unwrap();
    let transfer: Vec<&str> = messages(&events)
        .into_iter()
        .filter(|m| matches!(*m, "uploading" | "uploaded" | "dry-run"))
        .collect();
    assert_eq!(transfer, vec!["uploading", "uploaded"]);
    let uploaded = events.iter().find(|e| e.message == "uploaded").unwrap();
    assert_eq!(uploaded.get_str("key"), Some("__outputs/demo2/main.js"));
}

#[cfg(unix)]
#[tokio::test]
async fn cache_dirs_are_never_published() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "package.json", r#"{"scripts": {"build": "x"}}"#);

    let hub = EventHub::in_memory();
    let store = Arc::new(MemoryObjectStore::new());
    let pipeline = Pipeline::with_store(
        compiled_config(
            "mkdir -p dist/node_modules/dep dist/js/node_modules && \
             echo a > dist/index.html && echo b > dist/node_modules/dep/x.js && \
             echo c > dist/js/node_modules/y.js && echo d > dist/js/app.js",
        ),
        store.clone(),
    );

    pipeline
        .run(&hub, dir.path(), &project("cache"))
        .await
        .unwrap();

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(
        keys,
        vec!["__outputs/cache/index.html", "__outputs/cache/js/app.js"]
    );
}

#[tokio::test]
async fn keys_are_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", "<html></html>");
    write(dir.path(), "a/b/c.css", "body{}");

    let hub = EventHub::in_memory();
    let pipeline = Pipeline::with_store(
        PipelineConfig::default(),
        Arc::new(MemoryObjectStore::new()),
    );

    let first = pipeline.run(&hub, dir.path(), &project("same")).await.unwrap();
    let second = pipeline.run(&hub, dir.path(), &project("same")).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.keys, second.keys);
    assert!(first.keys.iter().all(|k| !k.contains('\\')));
}

#[tokio::test]
async fn dry_run_emits_one_event_per_artifact() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", "<html></html>");
    write(dir.path(), "assets/app.js", "1");
    write(dir.path(), "assets/app.css", "2");

    let hub = EventHub::in_memory();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    assert!(pipeline.is_dry_run());

    let summary = pipeline
        .run(&hub, dir.path(), &project("dry"))
        .await
        .unwrap();
    assert!(summary.dry_run);

    let events = hub.replay(&project("dry")).unwrap();
    let dry: Vec<&Event> = events.iter().filter(|e| e.message == "dry-run").collect();
    assert_eq!(dry.len(), 3);
    assert!(!messages(&events).contains(&"uploading"));

    let mut keys: Vec<&str> = dry.iter().filter_map(|e| e.get_str("key")).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "__outputs/dry/assets/app.css",
            "__outputs/dry/assets/app.js",
            "__outputs/dry/index.html"
        ]
    );
}

#[tokio::test]
async fn failed_upload_reports_path_and_fails_run() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", "<html></html>");

    let hub = EventHub::in_memory();
    let store = Arc::new(MemoryObjectStore::new());
    store.reject_keys_ending_with("index.html");
    let pipeline = Pipeline::with_store(PipelineConfig::default(), store);

    let err = pipeline
        .run(&hub, dir.path(), &project("xfer"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Transfer);
    assert_eq!(
        hub.replay(&project("xfer")).unwrap().last().unwrap().get_str("kind"),
        Some("transfer")
    );

    let events = hub.replay(&project("xfer")).unwrap();
    assert!(
        events
            .iter()
            .any(|e| e.level == Level::Error && e.get_str("path").is_some_and(|p| p.ends_with("index.html")))
    );
    assert_eq!(events.last().unwrap().status(), Some(DeploymentStatus::Failed));
}

#[tokio::test]
async fn live_observer_switches_to_archive_on_finish() {
    let hub = EventHub::in_memory();
    let demo = project("demo");
    let sink = hub.start_run(&demo).unwrap();

    let source = Arc::new(HubSource::new(hub.clone()));
    let watcher = StatusWatcher::new(source.clone(), source.clone(), source)
        .with_poll_interval(Duration::from_secs(3600));
    let (updates_tx, mut updates_rx) = mpsc::channel(64);

    let watch = tokio::spawn({
        let demo = demo.clone();
        async move {
            watcher
                .watch(&demo, &updates_tx, CancellationToken::new())
                .await
        }
    });

    match updates_rx.recv().await.unwrap() {
        WatchUpdate::Attached { status, mode } => {
            assert_eq!(status, DeploymentStatus::Queued);
            assert_eq!(mode, ViewMode::Live);
        }
        other => panic!("unexpected update: {other:?}"),
    }
    while hub.live_subscribers(&demo) == 0 {
        tokio::task::yield_now().await;
    }

    sink.info("installing");
    sink.info("compiling");
    sink.info("uploading");
    sink.notify(StatusNotice::finished("done"));

    let outcome = watch.await.unwrap().unwrap();

    assert_eq!(outcome.signal, TerminalSignal::Stream);
    assert_eq!(outcome.status, DeploymentStatus::Finished);
    assert_eq!(outcome.status.view_mode(), ViewMode::Archive);
    assert_eq!(hub.live_subscribers(&demo), 0);

    let mut live = Vec::new();
    let mut archived = None;
    while let Some(update) = updates_rx.recv().await {
        match update {
            WatchUpdate::Live(event) => live.push(event),
            WatchUpdate::Archive(events) => archived = Some(events),
            _ => {}
        }
    }
    let archived = archived.unwrap();

    assert_eq!(live.len(), 4);
    assert_eq!(archived, live);
    assert_eq!(
        messages(&archived),
        vec!["installing", "compiling", "uploading", "done"]
    );
    assert_eq!(archived[3].status(), Some(DeploymentStatus::Finished));
}

#[tokio::test]
async fn late_observer_goes_straight_to_archive() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", "<html></html>");
    let hub = EventHub::in_memory();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.run(&hub, dir.path(), &project("late")).await.unwrap();

    let source = Arc::new(HubSource::new(hub.clone()));
    let watcher = StatusWatcher::new(source.clone(), source.clone(), source);
    let (updates_tx, _updates_rx) = mpsc::channel(64);

    let outcome = watcher
        .watch(&project("late"), &updates_tx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.signal, TerminalSignal::Attach);
    assert_eq!(outcome.live_events, 0);
    assert_eq!(hub.live_subscribers(&project("late")), 0);
    assert_eq!(outcome.archive, hub.replay(&project("late")).unwrap());
}
