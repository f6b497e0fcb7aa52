use std::fs;
use std::path::Path;

use agent_protocol::{
    AgentEvent, AgentServer, RunRequest, ServerError, SessionSummary, SnapshotRecord,
};
use event_wire::{FrameParser, WireMessage};

/// Server id prefix; the rest of the id is the recording path.
pub const RECORDED_SERVER_PREFIX: &str = "recorded:";

const RECORDED_SERVER_ID: &str = "recorded";

/// Replays a captured NDJSON stream.
///
/// Every run re-emits the recorded run events in order. The last session list
/// and snapshot frames of the recording answer the session requests; a
/// recording is read-only, so renames and deletes are refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedServer {
    events: Vec<AgentEvent>,
    sessions: Vec<SessionSummary>,
    snapshot: Option<Vec<SnapshotRecord>>,
}

impl RecordedServer {
    pub fn from_path(path: &Path) -> Result<Self, ServerError> {
        let bytes = fs::read(path).map_err(|error| {
            ServerError::backend(format!(
                "Failed to read recording {}: {error}",
                path.display()
            ))
        })?;

        let mut parser = FrameParser::new();
        let mut messages = parser.feed(&bytes);
        messages.extend(parser.finish());
        if parser.skipped_frames() > 0 {
            tracing::warn!(
                path = %path.display(),
                skipped = parser.skipped_frames(),
                "recording contains undecodable frames"
            );
        }

        Ok(Self::from_messages(messages))
    }

    pub fn from_messages(messages: Vec<WireMessage>) -> Self {
        let mut server = Self {
            events: Vec::new(),
            sessions: Vec::new(),
            snapshot: None,
        };

        for message in messages {
            match message {
                WireMessage::Run(event) => server.events.push(event),
                WireMessage::SessionList(sessions) => server.sessions = sessions,
                WireMessage::SessionLoaded(records) => server.snapshot = Some(records),
            }
        }
        server
    }

    pub fn events(&self) -> &[AgentEvent] {
        &self.events
    }

    fn read_only() -> ServerError {
        ServerError::backend("recorded sessions are read-only")
    }
}

impl AgentServer for RecordedServer {
    fn server_id(&self) -> &str {
        RECORDED_SERVER_ID
    }

    fn submit_run(
        &self,
        request: RunRequest,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), ServerError> {
        tracing::debug!(
            run_id = request.run_id,
            events = self.events.len(),
            "replaying recording"
        );
        for event in &self.events {
            emit(event.clone());
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServerError> {
        Ok(self.sessions.clone())
    }

    fn load_session(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError> {
        let listed = self.sessions.iter().any(|summary| summary.id == session_id);
        match &self.snapshot {
            Some(records) if listed => Ok(records.clone()),
            _ => Err(ServerError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
        }
    }

    fn create_session(&self) -> Result<(), ServerError> {
        Ok(())
    }

    fn rename_session(&self, _session_id: &str, _new_name: &str) -> Result<(), ServerError> {
        Err(Self::read_only())
    }

    fn delete_session(&self, _session_id: &str) -> Result<(), ServerError> {
        Err(Self::read_only())
    }
}
