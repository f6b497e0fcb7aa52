use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub use agent_protocol::lock_unpoisoned;
use agent_protocol::{
    AgentEvent, AgentServer, RunEvent, RunId, RunRequest, ServerError, SessionSummary,
    SnapshotRecord,
};

use crate::client::{Client, ServerOps};

/// Owns the server handle, runs each submitted message on a worker thread and
/// buffers the tagged events until the owning thread applies them.
pub struct RuntimeController {
    client: Arc<Mutex<Client>>,
    server: Arc<dyn AgentServer>,
    pending_events: Arc<Mutex<VecDeque<RunEvent>>>,
    next_run_id: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
    render_requested: AtomicBool,
    stop_requested: AtomicBool,
}

impl RuntimeController {
    /// Creates a controller that buffers run events before applying them to `Client`.
    ///
    /// Nothing is applied until [`RuntimeController::flush_pending_run_events`]
    /// is called, so the caller decides on which thread the client changes.
    pub fn new(client: Arc<Mutex<Client>>, server: Arc<dyn AgentServer>) -> Arc<Self> {
        Arc::new(Self {
            client,
            server,
            pending_events: Arc::new(Mutex::new(VecDeque::new())),
            next_run_id: AtomicU64::new(1),
            workers: Mutex::new(Vec::new()),
            render_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        })
    }

    pub fn server_id(&self) -> &str {
        self.server.server_id()
    }

    fn start_run_internal(self: &Arc<Self>, message: String) -> Result<RunId, ServerError> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let request = RunRequest { run_id, message };
        let join_handle = self.spawn_worker(request)?;

        let mut workers = lock_unpoisoned(&self.workers);
        reap_finished(&mut workers);
        workers.push(join_handle);
        Ok(run_id)
    }

    fn spawn_worker(self: &Arc<Self>, request: RunRequest) -> Result<JoinHandle<()>, ServerError> {
        let run_id = request.run_id;
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("stepwise-run-{run_id}"))
            .spawn(move || controller.run_worker(request))
            .map_err(|error| ServerError::backend(format!("Failed to spawn run worker: {error}")))
    }

    fn run_worker(self: Arc<Self>, request: RunRequest) {
        let run_id = request.run_id;
        let terminal_emitted = AtomicBool::new(false);
        let server = Arc::clone(&self.server);

        let mut emit = |event: AgentEvent| {
            if event.is_terminal() {
                terminal_emitted.store(true, Ordering::SeqCst);
            }
            self.enqueue_run_event(RunEvent::new(run_id, event));
        };

        let run_outcome = catch_unwind(AssertUnwindSafe(|| server.submit_run(request, &mut emit)));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(AgentEvent::run_error(error.to_string())),
            Err(_) => emit(AgentEvent::run_error("Agent server panicked")),
        }

        if !terminal_emitted.load(Ordering::SeqCst) {
            tracing::debug!(run_id, "server returned without run_complete");
            emit(AgentEvent::RunComplete);
        }
    }

    fn enqueue_run_event(&self, event: RunEvent) {
        lock_unpoisoned(&self.pending_events).push_back(event);
    }

    /// Applies every queued run event to the client, in arrival order.
    ///
    /// Call this from the thread that owns presentation, for example once per
    /// input poll. Returns how many events were applied.
    pub fn flush_pending_run_events(self: &Arc<Self>) -> usize {
        let mut drained = 0usize;
        let mut host = Arc::clone(self);

        loop {
            let event = {
                let mut pending_events = lock_unpoisoned(&self.pending_events);
                pending_events.pop_front()
            };

            match event {
                Some(event) => {
                    lock_unpoisoned(&self.client).on_run_event(event, &mut host);
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    pub fn has_pending_events(&self) -> bool {
        !lock_unpoisoned(&self.pending_events).is_empty()
    }

    /// Returns and clears the render request flag.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Joins every worker thread. Abandoned runs are waited for as well.
    pub fn join_workers(&self) {
        let workers = std::mem::take(&mut *lock_unpoisoned(&self.workers));
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("run worker panicked outside the server call");
            }
        }
    }
}

impl ServerOps for Arc<RuntimeController> {
    fn start_run(&mut self, message: String) -> Result<RunId, ServerError> {
        self.start_run_internal(message)
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
        self.render_requested.store(true, Ordering::SeqCst);
    }

    fn request_stop(&mut self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

fn reap_finished(workers: &mut Vec<JoinHandle<()>>) {
    let mut index = 0;
    while index < workers.len() {
        if workers[index].is_finished() {
            let _ = workers.swap_remove(index).join();
        } else {
            index += 1;
        }
    }
}
