use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::DeploymentStatus;

/// Field names owned by the [`Event`] record itself. They never appear in
/// `extra`.
pub const RESERVED_FIELDS: [&str; 3] = ["ts", "level", "message"];

fn is_reserved(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

/// Severity of an [`Event`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }

    /// Parses a level name as it may appear inside a structured payload.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }
}

/// A single normalized progress record.
///
/// Serialized as one flat JSON object: `{ts, level, message, ...extra}`.
/// `extra` must not hold any of [`RESERVED_FIELDS`]; the builders below
/// drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            level,
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Adds a single extra field. Reserved field names are ignored.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !is_reserved(key) {
            self.extra.insert(key.to_string(), value.into());
        }
        self
    }

    /// Merges the fields of a serializable value into `extra`.
    ///
    /// Values that fail to serialize, or that are not objects, are dropped
    /// and the event keeps only its message. Reserved field names are
    /// skipped; use [`Payload::normalize`] to have a `level` field honored.
    pub fn with_fields<T: Serialize + ?Sized>(mut self, fields: &T) -> Self {
        if let Ok(Value::Object(map)) = serde_json::to_value(fields) {
            self.extra
                .extend(map.into_iter().filter(|(key, _)| !is_reserved(key)));
        }
        self
    }

    /// Returns an extra field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Returns an extra field as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// The deployment status carried by this event, if it is a status event.
    pub fn status(&self) -> Option<DeploymentStatus> {
        self.get_str("status").and_then(DeploymentStatus::parse)
    }

    /// Whether this event reports a terminal deployment status.
    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(|s| s.is_terminal())
    }

    /// Encodes the event as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> String {
        if self.extra.keys().any(|key| is_reserved(key)) {
            let mut clean = self.clone();
            clean.extra.retain(|key, _| !is_reserved(key));
            return clean.to_json_line();
        }

        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(_) => {
                let bare = Event {
                    ts: self.ts,
                    level: self.level,
                    message: self.message.clone(),
                    extra: Map::new(),
                };
                serde_json::to_string(&bare).unwrap_or_default()
            }
        }
    }
}

/// A progress payload before normalization.
///
/// Producers hand the sink whatever they have; [`Payload::normalize`] is the
/// single total mapping onto the canonical [`Event`] record.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain text, becomes the event message.
    Text(String),
    /// Structured fields, shallow-copied into the event.
    Structured(Map<String, Value>),
    /// Anything else, stringified into the message.
    Other(Value),
}

impl Payload {
    /// Builds a payload from any serializable value.
    ///
    /// A value that cannot be serialized degrades to a text payload
    /// describing the failure.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::from(v),
            Err(e) => Payload::Text(format!("unserializable payload: {e}")),
        }
    }

    /// A structured payload made of `message` plus the fields of a
    /// serializable value.
    ///
    /// The explicit `message` wins over a `message` field. Fields that fail
    /// to serialize, or are not an object, leave a plain text payload.
    pub fn with_message<T: Serialize + ?Sized>(message: &str, fields: &T) -> Self {
        match serde_json::to_value(fields) {
            Ok(Value::Object(mut map)) => {
                map.insert("message".into(), Value::from(message));
                Payload::Structured(map)
            }
            _ => Payload::Text(message.to_string()),
        }
    }

    /// Normalizes the payload into an [`Event`] at the given time.
    ///
    /// `requested` is the level asked for by the caller; a structured
    /// payload carrying a recognizable `level` field overrides it.
    pub fn normalize(self, requested: Level, ts: DateTime<Utc>) -> Event {
        match self {
            Payload::Text(message) => Event {
                ts,
                level: requested,
                message,
                extra: Map::new(),
            },
            Payload::Structured(mut fields) => {
                let level = fields
                    .remove("level")
                    .and_then(|v| v.as_str().and_then(Level::parse))
                    .unwrap_or(requested);
                let message = match fields.remove("message") {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                // The sink owns the timestamp.
                fields.remove("ts");
                Event {
                    ts,
                    level,
                    message,
                    extra: fields,
                }
            }
            Payload::Other(value) => Event {
                ts,
                level: requested,
                message: value.to_string(),
                extra: Map::new(),
            },
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Payload::Structured(map)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Payload::Text(s),
            Value::Object(map) => Payload::Structured(map),
            other => Payload::Other(other),
        }
    }
}
