use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::{Level, Payload};

/// Lifecycle status of a deployment as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Queued,
    Building,
    Finished,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Finished => "finished",
            DeploymentStatus::Failed => "failed",
        }
    }

    /// Parses a status string. `error` is accepted as a synonym for `failed`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DeploymentStatus::Queued),
            "building" => Some(DeploymentStatus::Building),
            "finished" => Some(DeploymentStatus::Finished),
            "failed" | "error" => Some(DeploymentStatus::Failed),
            _ => None,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Finished | DeploymentStatus::Failed)
    }

    /// How an observer should consume progress in this status.
    pub fn view_mode(&self) -> ViewMode {
        if self.is_terminal() {
            ViewMode::Archive
        } else {
            ViewMode::Live
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer consumption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Progress arrives over a push-based stream.
    Live,
    /// Progress is replayed from the stored event list.
    Archive,
}

/// A status change notification, carried as an event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured details, such as a failure kind or exit code.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl StatusNotice {
    pub fn building() -> Self {
        Self {
            status: DeploymentStatus::Building,
            message: None,
            details: Map::new(),
        }
    }

    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            status: DeploymentStatus::Finished,
            message: Some(message.into()),
            details: Map::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: DeploymentStatus::Failed,
            message: Some(message.into()),
            details: Map::new(),
        }
    }

    /// Adds a detail field. Names the notice itself owns (`status`,
    /// `message`, `level`, `ts`) are ignored.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !matches!(key, "status" | "message" | "level" | "ts") {
            self.details.insert(key.to_string(), value.into());
        }
        self
    }

    /// The level a sink should record this notice at.
    pub fn level(&self) -> Level {
        match self.status {
            DeploymentStatus::Failed => Level::Error,
            _ => Level::Info,
        }
    }

    /// Converts the notice into a structured event payload.
    pub fn into_payload(self) -> Payload {
        let mut fields = self.details;
        fields.insert("status".into(), Value::from(self.status.as_str()));
        let message = self
            .message
            .unwrap_or_else(|| format!("status: {}", self.status));
        fields.insert("message".into(), Value::from(message));
        Payload::Structured(fields)
    }
}
