//! Append-only event sink for one pipeline run.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use slipway_protocol::{Event, Level, Payload, ProjectId, StatusNotice};
use tokio::sync::broadcast;

use crate::hub::EventHub;

/// Normalizes progress payloads and emits them in order.
///
/// Cheap to clone; clones share the same ordering lock, so the stdout
/// relay, the stderr relay and the publisher can all emit concurrently.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    hub: EventHub,
    project: ProjectId,
    run_id: String,
    live: broadcast::Sender<Event>,
    /// Held while an event is archived and broadcast so both see the same order.
    order: Mutex<()>,
}

impl EventSink {
    pub(crate) fn new(hub: EventHub, project: ProjectId, run_id: String) -> Self {
        let live = hub.attach_run(&project);
        Self {
            inner: Arc::new(SinkInner {
                hub,
                project,
                run_id,
                live,
                order: Mutex::new(()),
            }),
        }
    }

    pub fn project(&self) -> &ProjectId {
        &self.inner.project
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    /// Normalizes `payload` at the requested level and emits it.
    pub fn emit(&self, level: Level, payload: impl Into<Payload>) -> Event {
        let event = payload.into().normalize(level, Utc::now());
        self.record(event)
    }

    /// Emits a message with extra fields taken from a serializable value.
    ///
    /// The fields go through the same normalization as any structured
    /// payload, so a `level` field overrides `level`. If `fields` fails to
    /// serialize, only the message is emitted.
    pub fn emit_fields<T: Serialize + ?Sized>(&self, level: Level, message: &str, fields: &T) -> Event {
        self.emit(level, Payload::with_message(message, fields))
    }

    pub fn info(&self, message: impl Into<String>) -> Event {
        self.emit(Level::Info, message.into())
    }

    pub fn warn(&self, message: impl Into<String>) -> Event {
        self.emit(Level::Warn, message.into())
    }

    pub fn error(&self, message: impl Into<String>) -> Event {
        self.emit(Level::Error, message.into())
    }

    /// Emits a status notice; the hub's status board follows it.
    pub fn notify(&self, notice: StatusNotice) -> Event {
        let level = notice.level();
        self.emit(level, notice.into_payload())
    }

    /// Appends an already-normalized event.
    pub fn record(&self, event: Event) -> Event {
        let inner = &self.inner;
        let _guard = inner.order.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Err(e) = inner
            .hub
            .archive()
            .append(&inner.project, &inner.run_id, &event)
        {
            tracing::warn!(project = %inner.project, error = %e, "failed to archive event");
        }

        if let Some(status) = event.status() {
            inner.hub.set_status(&inner.project, status);
        }

        // No receivers is fine: nobody is watching live.
        let _ = inner.live.send(event.clone());

        mirror_to_tracing(&inner.project, &event);
        event
    }
}

impl Drop for SinkInner {
    fn drop(&mut self) {
        self.hub.archive().finish_run(&self.project, &self.run_id);
        self.hub.detach_run(&self.project);
    }
}

fn mirror_to_tracing(project: &ProjectId, event: &Event) {
    let stream = event.get_str("stream").unwrap_or("");
    match event.level {
        Level::Info => tracing::info!(project = %project, stream, "{}", event.message),
        Level::Warn => tracing::warn!(project = %project, stream, "{}", event.message),
        Level::Error => tracing::error!(project = %project, stream, "{}", event.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slipway_protocol::DeploymentStatus;

    fn setup() -> (EventHub, ProjectId, EventSink) {
        let hub = EventHub::in_memory();
        let project = ProjectId::new("demo").unwrap();
        let sink = hub.start_run(&project).unwrap();
        (hub, project, sink)
    }

    #[test]
    fn emit_defaults_to_requested_level() {
        let (_, _, sink) = setup();
        let event = sink.emit(Level::Info, "hello");
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.message, "hello");
    }

    #[test]
    fn structured_payload_level_wins() {
        let (_, _, sink) = setup();
        let event = sink.emit(Level::Info, json!({"message": "m", "level": "error"}));
        assert_eq!(event.level, Level::Error);
    }

    #[test]
    fn events_are_archived_in_order() {
        let (hub, project, sink) = setup();
        sink.info("one");
        sink.warn("two");
        sink.error("three");

        let levels: Vec<Level> = hub.replay(&project).unwrap().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::Info, Level::Warn, Level::Error]);
    }

    #[test]
    fn emit_fields_attaches_extra() {
        #[derive(Serialize)]
        struct Upload<'a> {
            path: &'a str,
            key: &'a str,
        }
        let (_, _, sink) = setup();
        let event = sink.emit_fields(
            Level::Info,
            "uploaded",
            &Upload {
                path: "/site/index.html",
                key: "__outputs/demo/index.html",
            },
        );
        assert_eq!(event.get_str("key"), Some("__outputs/demo/index.html"));
    }

    #[test]
    fn emit_fields_survives_unserializable_extra() {
        use std::collections::HashMap;
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((0, 0), 0);
        let (hub, project, sink) = setup();
        let event = sink.emit_fields(Level::Info, "still emitted", &bad);
        assert!(event.extra.is_empty());
        assert_eq!(hub.replay(&project).unwrap()[0].message, "still emitted");
    }

    #[test]
    fn emit_fields_level_escalates_and_survives_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let hub = EventHub::new(Arc::new(crate::JsonLinesArchive::new(tmp.path())));
        let project = ProjectId::new("disk").unwrap();
        let mut rx = hub.subscribe(&project);
        let sink = hub.start_run(&project).unwrap();

        let event = sink.emit_fields(Level::Info, "disk low", &json!({"level": "warn", "free": 3}));
        assert_eq!(event.level, Level::Warn);
        assert_eq!(event.message, "disk low");
        assert!(event.get("level").is_none());
        drop(sink);

        let live = rx.try_recv().unwrap();
        let archived = hub.replay(&project).unwrap();
        assert_eq!(archived, vec![live]);
        assert_eq!(archived[0].get("free"), Some(&json!(3)));
    }

    #[test]
    fn notify_failed_is_error_level() {
        let (hub, project, sink) = setup();
        let event = sink.notify(StatusNotice::failed("boom"));
        assert_eq!(event.level, Level::Error);
        assert_eq!(hub.status(&project), Some(DeploymentStatus::Failed));
    }

    #[tokio::test]
    async fn concurrent_producers_keep_archive_and_live_order_identical() {
        let (hub, project, sink) = setup();
        let mut rx = hub.subscribe(&project);

        let mut handles = Vec::new();
        for producer in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    sink.info(format!("p{producer}-{i}"));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let archived: Vec<String> = hub
            .replay(&project)
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        let mut live = Vec::new();
        while let Ok(event) = rx.try_recv() {
            live.push(event.message);
        }

        assert_eq!(archived.len(), 100);
        assert_eq!(archived, live);
    }
}
