//! Deterministic in-memory implementation of the `agent_protocol` server contract.
//!
//! Runs follow queued [`RunScript`]s (or an echo script when none is queued),
//! streaming character-chunked deltas before each finalized step. Sessions live
//! in memory only; this crate is meant for local development and tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use agent_protocol::{
    lock_unpoisoned, preview_for_task, AgentEvent, AgentServer, RunRequest, ServerError,
    SessionId, SessionSummary, SnapshotRecord,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

mod script;

pub use script::{
    finish_run, stream_script, stream_steps, RunScript, ScriptOutcome, ScriptedStep,
    StreamedRun, DELTA_CHUNK_CHARS,
};

/// Stable server identifier used for explicit startup selection.
pub const MOCK_SERVER_ID: &str = "mock";

#[derive(Debug, Clone, PartialEq, Eq)]
struct MockSession {
    id: SessionId,
    timestamp: String,
    preview: String,
    records: Vec<SnapshotRecord>,
}

impl MockSession {
    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            preview: self.preview.clone(),
            timestamp: self.timestamp.clone(),
        }
    }

    fn last_step_number(&self) -> u32 {
        self.records
            .iter()
            .filter_map(|record| match record {
                SnapshotRecord::Step(step) => Some(step.step_number),
                SnapshotRecord::Task { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct SessionBook {
    /// Newest first.
    sessions: Vec<MockSession>,
    current: Option<SessionId>,
    next_id: u64,
}

impl SessionBook {
    fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == session_id)
    }

    fn not_found(session_id: &str) -> ServerError {
        ServerError::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }
}

/// Deterministic mock server used by client tests and local runs.
#[derive(Debug)]
pub struct MockServer {
    scripts: Mutex<VecDeque<RunScript>>,
    token_delay: Duration,
    book: Mutex<SessionBook>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    const TOKEN_DELAY_MS: u64 = 15;

    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            token_delay: Duration::from_millis(Self::TOKEN_DELAY_MS),
            book: Mutex::new(SessionBook::default()),
        }
    }

    /// Server that streams without pauses between deltas.
    #[must_use]
    pub fn instant() -> Self {
        Self::new().with_token_delay(Duration::ZERO)
    }

    #[must_use]
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    /// Queues a script for the next run; unqueued runs use [`RunScript::echo`].
    pub fn push_script(&self, script: RunScript) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    /// The session the next run appends to, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        lock_unpoisoned(&self.book).current.clone()
    }

    fn next_script(&self, message: &str) -> RunScript {
        lock_unpoisoned(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| RunScript::echo(message))
    }

    /// Session the run will append to, and the number of its first step.
    fn run_target(&self) -> (Option<SessionId>, u32) {
        let book = lock_unpoisoned(&self.book);
        let target = book.current.clone();
        let first_step = target
            .as_deref()
            .and_then(|id| book.position(id))
            .map_or(1, |index| book.sessions[index].last_step_number() + 1);
        (target, first_step)
    }

    /// Saves a finished run, failed or not, into `target`, or into a new
    /// session when the run started detached. The saved session moves to the
    /// front of the listing. A new session becomes current only if the client
    /// has not switched sessions meanwhile.
    fn save_run(&self, target: Option<SessionId>, message: &str, streamed: &StreamedRun) {
        let mut records = vec![SnapshotRecord::task(message)];
        records.extend(streamed.records.iter().cloned().map(SnapshotRecord::Step));

        let mut book = lock_unpoisoned(&self.book);
        let timestamp = now_timestamp();
        if let Some(index) = target.as_deref().and_then(|id| book.position(id)) {
            let mut session = book.sessions.remove(index);
            session.records.extend(records);
            session.timestamp = timestamp;
            book.sessions.insert(0, session);
            return;
        }

        book.next_id += 1;
        let id = format!("mock-{}", book.next_id);
        book.sessions.insert(
            0,
            MockSession {
                id: id.clone(),
                timestamp,
                preview: preview_for_task(message),
                records,
            },
        );
        if book.current == target {
            book.current = Some(id);
        }
    }
}

impl AgentServer for MockServer {
    fn server_id(&self) -> &str {
        MOCK_SERVER_ID
    }

    fn submit_run(
        &self,
        request: RunRequest,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), ServerError> {
        if request.message.trim().is_empty() {
            return Err(ServerError::RunRejected {
                run_id: request.run_id,
                reason: "empty message".to_string(),
            });
        }

        let script = self.next_script(&request.message);
        let (target, first_step) = self.run_target();
        tracing::debug!(run_id = request.run_id, first_step, "mock run started");

        let streamed = stream_steps(&script, first_step, self.token_delay, emit);
        self.save_run(target, &request.message, &streamed);
        finish_run(&script, emit);
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServerError> {
        let book = lock_unpoisoned(&self.book);
        Ok(book.sessions.iter().map(MockSession::summary).collect())
    }

    fn load_session(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError> {
        let mut book = lock_unpoisoned(&self.book);
        let index = book
            .position(session_id)
            .ok_or_else(|| SessionBook::not_found(session_id))?;
        book.current = Some(session_id.to_string());
        Ok(book.sessions[index].records.clone())
    }

    fn create_session(&self) -> Result<(), ServerError> {
        lock_unpoisoned(&self.book).current = None;
        Ok(())
    }

    fn rename_session(&self, session_id: &str, new_name: &str) -> Result<(), ServerError> {
        let mut book = lock_unpoisoned(&self.book);
        let index = book
            .position(session_id)
            .ok_or_else(|| SessionBook::not_found(session_id))?;
        book.sessions[index].preview = new_name.to_string();
        Ok(())
    }

    fn delete_session(&self, session_id: &str) -> Result<(), ServerError> {
        let mut book = lock_unpoisoned(&self.book);
        let index = book
            .position(session_id)
            .ok_or_else(|| SessionBook::not_found(session_id))?;
        book.sessions.remove(index);
        if book.current.as_deref() == Some(session_id) {
            book.current = None;
        }
        Ok(())
    }
}

fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string())
}

#[cfg(test)]
mod tests {
    use agent_protocol::{AgentEvent, AgentServer, RunRequest, ServerError, SnapshotRecord};
    use pretty_assertions::assert_eq;

    use super::*;

    fn run(server: &MockServer, run_id: u64, message: &str) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        server
            .submit_run(
                RunRequest {
                    run_id,
                    message: message.to_string(),
                },
                &mut |event| events.push(event),
            )
            .expect("mock run should succeed");
        events
    }

    #[test]
    fn server_id_is_mock() {
        assert_eq!(MockServer::instant().server_id(), MOCK_SERVER_ID);
    }

    #[test]
    fn first_run_creates_current_session_with_preview() {
        let server = MockServer::instant();
        let events = run(&server, 1, "Hello there");
        assert_eq!(events.last(), Some(&AgentEvent::RunComplete));

        let sessions = server.list_sessions().expect("list");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].preview, "Hello there...");
        assert_eq!(server.current_session(), Some(sessions[0].id.clone()));
    }

    #[test]
    fn step_numbers_continue_within_a_session() {
        let server = MockServer::instant();
        run(&server, 1, "first");
        let events = run(&server, 2, "second");

        let first_step = events.iter().find_map(|event| match event {
            AgentEvent::StepFinalized(record) => Some(record.step_number),
            _ => None,
        });
        assert_eq!(first_step, Some(3));

        let id = server.current_session().expect("current session");
        let records = server.load_session(&id).expect("load");
        let tasks = records
            .iter()
            .filter(|record| matches!(record, SnapshotRecord::Task { .. }))
            .count();
        assert_eq!(tasks, 2);
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn create_session_detaches_so_next_run_starts_fresh() {
        let server = MockServer::instant();
        run(&server, 1, "first");
        server.create_session().expect("create");
        assert_eq!(server.current_session(), None);

        run(&server, 2, "second");
        let sessions = server.list_sessions().expect("list");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].preview, "second...");
    }

    #[test]
    fn session_is_saved_before_final_answer_is_emitted() {
        let server = MockServer::instant();
        let mut listed_at_answer = None;
        server
            .submit_run(
                RunRequest {
                    run_id: 1,
                    message: "hi".to_string(),
                },
                &mut |event| {
                    if matches!(event, AgentEvent::FinalAnswer { .. }) {
                        listed_at_answer = Some(server.list_sessions().expect("list").len());
                    }
                },
            )
            .expect("mock run should succeed");

        assert_eq!(listed_at_answer, Some(1));
    }

    #[test]
    fn run_started_detached_does_not_steal_focus_after_switch() {
        let server = MockServer::instant();
        run(&server, 1, "first");
        let first = server.current_session().expect("first session");
        server.create_session().expect("create");

        let mut switched = false;
        server
            .submit_run(
                RunRequest {
                    run_id: 2,
                    message: "second".to_string(),
                },
                &mut |event| {
                    if !switched && matches!(event, AgentEvent::TextDelta { .. }) {
                        server.load_session(&first).expect("load first");
                        switched = true;
                    }
                },
            )
            .expect("mock run should succeed");

        assert_eq!(server.list_sessions().expect("list").len(), 2);
        assert_eq!(server.current_session(), Some(first));
    }

    fn step_numbers(events: &[AgentEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|event| match event {
                AgentEvent::StepFinalized(record) => Some(record.step_number),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn failed_run_is_saved_without_a_final_answer() {
        let server = MockServer::instant();
        server.push_script(RunScript::failing(Vec::new(), "boom"));
        let events = run(&server, 1, "task");

        assert_eq!(
            events,
            vec![AgentEvent::run_error("boom"), AgentEvent::RunComplete]
        );
        let sessions = server.list_sessions().expect("list");
        assert_eq!(sessions.len(), 1);
        assert_eq!(
            server.load_session(&sessions[0].id).expect("load"),
            vec![SnapshotRecord::task("task")]
        );
    }

    #[test]
    fn step_numbers_keep_increasing_across_a_failed_run() {
        let server = MockServer::instant();
        let first = run(&server, 1, "first");
        server.push_script(RunScript::failing(
            vec![ScriptedStep::new("Try", "1/0").failing("ZeroDivisionError")],
            "Agent stopped",
        ));
        let failed = run(&server, 2, "second");
        let third = run(&server, 3, "third");

        assert_eq!(step_numbers(&first), vec![1, 2]);
        assert_eq!(step_numbers(&failed), vec![3]);
        assert_eq!(step_numbers(&third), vec![4, 5]);

        let id = server.current_session().expect("current session");
        let records = server.load_session(&id).expect("load");
        assert_eq!(records.len(), 8);
        match &records[4] {
            SnapshotRecord::Step(step) => {
                assert_eq!(step.step_number, 3);
                assert!(step.failed);
                assert!(!step.is_final_answer);
            }
            other => panic!("expected the failed step, got {other:?}"),
        }
    }

    #[test]
    fn appending_moves_the_session_to_the_front() {
        let server = MockServer::instant();
        run(&server, 1, "older");
        let older = server.current_session().expect("older");
        server.create_session().expect("create");
        run(&server, 2, "newer");
        assert_eq!(server.list_sessions().expect("list")[1].id, older);

        server.load_session(&older).expect("load");
        run(&server, 3, "again");

        let sessions = server.list_sessions().expect("list");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, older);
    }

    #[test]
    fn unknown_sessions_are_reported() {
        let server = MockServer::instant();
        assert_eq!(
            server.load_session("nope"),
            Err(ServerError::SessionNotFound {
                session_id: "nope".to_string()
            })
        );
        assert!(server.rename_session("nope", "x").is_err());
        assert!(server.delete_session("nope").is_err());
    }

    #[test]
    fn rename_and_delete_update_listing() {
        let server = MockServer::instant();
        run(&server, 1, "task");
        let id = server.list_sessions().expect("list")[0].id.clone();

        server.rename_session(&id, "Renamed").expect("rename");
        assert_eq!(server.list_sessions().expect("list")[0].preview, "Renamed");

        server.delete_session(&id).expect("delete");
        assert!(server.list_sessions().expect("list").is_empty());
        assert_eq!(server.current_session(), None);
    }

    #[test]
    fn blank_message_is_rejected() {
        let server = MockServer::instant();
        let result = server.submit_run(
            RunRequest {
                run_id: 9,
                message: "  ".to_string(),
            },
            &mut |_| {},
        );
        assert!(matches!(result, Err(ServerError::RunRejected { run_id: 9, .. })));
    }
}
