#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use agent_protocol::{
    AgentEvent, AgentServer, RunEvent, RunId, RunRequest, ServerError, SessionSummary,
    SnapshotRecord,
};
use stepwise_client::client::{Client, ServerOps};

/// Host that runs the server synchronously and holds the events back until a
/// test delivers them.
pub struct ServerHost<S: AgentServer> {
    pub server: S,
    pub next_run_id: RunId,
    pub started: Vec<String>,
    pub pending: VecDeque<RunEvent>,
    pub render_requests: usize,
    pub stop_requests: usize,
}

impl<S: AgentServer> ServerHost<S> {
    pub fn new(server: S) -> Self {
        Self {
            server,
            next_run_id: 0,
            started: Vec::new(),
            pending: VecDeque::new(),
            render_requests: 0,
            stop_requests: 0,
        }
    }

    /// Applies up to `count` held events in order; returns how many were applied.
    pub fn deliver(&mut self, client: &mut Client, count: usize) -> usize {
        let mut delivered = 0;
        while delivered < count {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            client.on_run_event(event, self);
            delivered += 1;
        }
        delivered
    }

    pub fn deliver_all(&mut self, client: &mut Client) -> usize {
        self.deliver(client, usize::MAX)
    }

    /// Submits `message` and delivers every event of the run.
    pub fn run_to_completion(&mut self, client: &mut Client, message: &str) {
        client.on_input_replace(message.to_string());
        client.on_submit(self);
        self.deliver_all(client);
    }
}

impl<S: AgentServer> ServerOps for ServerHost<S> {
    fn start_run(&mut self, message: String) -> Result<RunId, ServerError> {
        self.next_run_id += 1;
        let run_id = self.next_run_id;
        self.started.push(message.clone());

        let pending = &mut self.pending;
        self.server.submit_run(
            RunRequest { run_id, message },
            &mut |event| pending.push_back(RunEvent::new(run_id, event)),
        )?;
        Ok(run_id)
    }

    fn list_sessions(&mut self) -> Result<Vec<SessionSummary>, ServerError> {
        self.server.list_sessions()
    }

    fn load_session(&mut self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError> {
        self.server.load_session(session_id)
    }

    fn create_session(&mut self) -> Result<(), ServerError> {
        self.server.create_session()
    }

    fn rename_session(&mut self, session_id: &str, new_name: &str) -> Result<(), ServerError> {
        self.server.rename_session(session_id, new_name)
    }

    fn delete_session(&mut self, session_id: &str) -> Result<(), ServerError> {
        self.server.delete_session(session_id)
    }

    fn request_render(&mut self) {
        self.render_requests += 1;
    }

    fn request_stop(&mut self) {
        self.stop_requests += 1;
    }
}

/// Wraps a server and fails its listing, rename and delete requests while
/// switched on. Runs and loads pass through.
pub struct FlakySessions<S: AgentServer> {
    pub inner: S,
    failing: AtomicBool,
}

impl<S: AgentServer> FlakySessions<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, request: &str) -> Result<(), ServerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServerError::backend(format!("{request} unavailable")));
        }
        Ok(())
    }
}

impl<S: AgentServer> AgentServer for FlakySessions<S> {
    fn server_id(&self) -> &str {
        self.inner.server_id()
    }

    fn submit_run(
        &self,
        request: RunRequest,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), ServerError> {
        self.inner.submit_run(request, emit)
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServerError> {
        self.check("listing")?;
        self.inner.list_sessions()
    }

    fn load_session(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError> {
        self.inner.load_session(session_id)
    }

    fn create_session(&self) -> Result<(), ServerError> {
        self.inner.create_session()
    }

    fn rename_session(&self, session_id: &str, new_name: &str) -> Result<(), ServerError> {
        self.check("rename")?;
        self.inner.rename_session(session_id, new_name)
    }

    fn delete_session(&self, session_id: &str) -> Result<(), ServerError> {
        self.check("delete")?;
        self.inner.delete_session(session_id)
    }
}
