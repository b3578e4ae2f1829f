use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Identifier used to namespace storage keys and archived events.
///
/// Rejects:
/// - Empty ids
/// - `.` and `..`
/// - Anything outside ASCII alphanumerics, `-`, `_` and `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ProtocolError::InvalidProjectId("empty id".into()));
        }

        if id == "." || id == ".." {
            return Err(ProtocolError::InvalidProjectId(format!(
                "reserved id not allowed: {id}"
            )));
        }

        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ProtocolError::InvalidProjectId(format!(
                "character {c:?} not allowed: {id}"
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProjectId::new(value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}
