use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use agent_protocol::{
    lock_unpoisoned, AgentEvent, AgentServer, RunRequest, ServerError, SessionId, SessionSummary,
    SnapshotRecord,
};
use agent_server_mock::{finish_run, stream_steps, RunScript, StreamedRun};
use session_store::{SessionDirectoryStore, SessionStoreError};

pub const LOCAL_SERVER_ID: &str = "local";

const TOKEN_DELAY_MS: u64 = 15;

/// Scripted runs persisted as JSONL session files under one root directory.
#[derive(Debug)]
pub struct LocalServer {
    directory: SessionDirectoryStore,
    scripts: Mutex<VecDeque<RunScript>>,
    token_delay: Duration,
    current: Mutex<Option<SessionId>>,
}

impl LocalServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            directory: SessionDirectoryStore::new(root),
            scripts: Mutex::new(VecDeque::new()),
            token_delay: Duration::from_millis(TOKEN_DELAY_MS),
            current: Mutex::new(None),
        }
    }

    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    pub fn push_script(&self, script: RunScript) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    pub fn current_session(&self) -> Option<SessionId> {
        lock_unpoisoned(&self.current).clone()
    }

    pub fn directory(&self) -> &SessionDirectoryStore {
        &self.directory
    }

    fn next_script(&self, message: &str) -> RunScript {
        lock_unpoisoned(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| RunScript::echo(message))
    }

    fn first_step(&self, target: Option<&str>) -> Result<u32, ServerError> {
        let Some(session_id) = target else {
            return Ok(1);
        };

        let store = self.directory.find(session_id).map_err(store_error)?;
        Ok(store.last_step_number().map_or(1, |number| number.saturating_add(1)))
    }

    fn save_run(
        &self,
        target: Option<SessionId>,
        message: &str,
        streamed: &StreamedRun,
    ) -> Result<(), ServerError> {
        let mut records = vec![SnapshotRecord::task(message)];
        records.extend(streamed.records.iter().cloned().map(SnapshotRecord::Step));

        let mut store = match target.as_deref() {
            Some(session_id) => self.directory.find(session_id),
            None => self.directory.create(),
        }
        .map_err(store_error)?;
        store.append_records(&records).map_err(store_error)?;

        let mut current = lock_unpoisoned(&self.current);
        if *current == target {
            *current = Some(store.session_id().to_string());
        }
        tracing::debug!(session_id = store.session_id(), "saved run");
        Ok(())
    }
}

impl AgentServer for LocalServer {
    fn server_id(&self) -> &str {
        LOCAL_SERVER_ID
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
        let target = self.current_session();
        let first_step = self.first_step(target.as_deref())?;

        let streamed = stream_steps(&script, first_step, self.token_delay, emit);
        self.save_run(target, &request.message, &streamed)?;
        finish_run(&script, emit);
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServerError> {
        self.directory.list().map_err(store_error)
    }

    fn load_session(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError> {
        let store = self.directory.find(session_id).map_err(store_error)?;
        *lock_unpoisoned(&self.current) = Some(session_id.to_string());
        Ok(store.records().to_vec())
    }

    fn create_session(&self) -> Result<(), ServerError> {
        *lock_unpoisoned(&self.current) = None;
        Ok(())
    }

    fn rename_session(&self, session_id: &str, new_name: &str) -> Result<(), ServerError> {
        self.directory
            .rename(session_id, new_name)
            .map(|_| ())
            .map_err(store_error)
    }

    fn delete_session(&self, session_id: &str) -> Result<(), ServerError> {
        self.directory.delete(session_id).map_err(store_error)?;
        let mut current = lock_unpoisoned(&self.current);
        if current.as_deref() == Some(session_id) {
            *current = None;
        }
        Ok(())
    }
}

fn store_error(error: SessionStoreError) -> ServerError {
    match error {
        SessionStoreError::SessionNotFound { session_id, .. } => {
            ServerError::SessionNotFound { session_id }
        }
        other => ServerError::backend(other.to_string()),
    }
}
