use agent_protocol::{SessionSummary, SnapshotRecord, NEW_SESSION_PREVIEW};
use serde::{Deserialize, Serialize};

/// First line of every session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionHeader {
    pub version: u32,
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub preview: String,
}

impl SessionHeader {
    #[must_use]
    pub fn v1(session_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        let created_at = created_at.into();
        Self {
            version: 1,
            session_id: session_id.into(),
            updated_at: created_at.clone(),
            created_at,
            preview: NEW_SESSION_PREVIEW.to_string(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.session_id.clone(),
            preview: self.preview.clone(),
            timestamp: self.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonLine {
    Session(SessionHeader),
    Record(SnapshotRecord),
}
