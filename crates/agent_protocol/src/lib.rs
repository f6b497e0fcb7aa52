//! Server-neutral contract between an agent run server and a transcript client.
//!
//! This crate defines only the event vocabulary of one run, the persisted
//! snapshot records of a session, and the request surface a client issues.
//! It carries no transport, no rendering and no transcript state.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier for one run started by the client.
pub type RunId = u64;

/// Opaque server-assigned session identifier.
pub type SessionId = String;

/// One completed reasoning/action step as the server reports it.
///
/// The same record shape is used for live `step_finalized` events and for
/// persisted snapshot steps, so both paths build transcript steps from
/// identical input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub failed: bool,
    /// Set on the step that produced the run's final answer (snapshots only).
    #[serde(default)]
    pub is_final_answer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_output: Option<String>,
    #[serde(default)]
    pub is_image: bool,
}

impl StepRecord {
    #[must_use]
    pub fn new(step_number: u32) -> Self {
        Self {
            step_number,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.model_output = Some(thought.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code_action = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = Some(observations.into());
        self
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.failed = true;
        self
    }

    /// Marks this record as carrying the run's final answer.
    #[must_use]
    pub fn with_final_answer(mut self, content: impl Into<String>, is_image: bool) -> Self {
        self.is_final_answer = true;
        self.action_output = Some(content.into());
        self.is_image = is_image;
        self
    }

    /// Returns true when the step reports a failure by flag or by error text.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed || self.error.as_deref().is_some_and(|error| !error.trim().is_empty())
    }
}

/// One entry of a persisted session snapshot, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotRecord {
    Task { task: String },
    Step(StepRecord),
}

impl SnapshotRecord {
    #[must_use]
    pub fn task(task: impl Into<String>) -> Self {
        Self::Task { task: task.into() }
    }
}

/// Lightweight summary of one past session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub preview: String,
    pub timestamp: String,
}

/// Preview of a session that has no task yet.
pub const NEW_SESSION_PREVIEW: &str = "New Chat";
pub const PREVIEW_CHAR_LIMIT: usize = 50;

/// Preview text for a session whose first task is `task`.
#[must_use]
pub fn preview_for_task(task: &str) -> String {
    if task.is_empty() {
        return NEW_SESSION_PREVIEW.to_string();
    }
    let head: String = task.chars().take(PREVIEW_CHAR_LIMIT).collect();
    format!("{head}...")
}

/// Lifecycle event emitted by the server for the active run, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    TextDelta {
        content: String,
    },
    ToolStart {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
    },
    StepFinalized(StepRecord),
    FinalAnswer {
        content: String,
        #[serde(default)]
        is_image: bool,
    },
    RunError {
        message: String,
    },
    RunComplete,
}

impl AgentEvent {
    #[must_use]
    pub fn text_delta(content: impl Into<String>) -> Self {
        Self::TextDelta {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn tool_start(tool_name: impl Into<String>) -> Self {
        Self::ToolStart {
            tool_name: tool_name.into(),
            arguments: None,
        }
    }

    #[must_use]
    pub fn final_answer(content: impl Into<String>, is_image: bool) -> Self {
        Self::FinalAnswer {
            content: content.into(),
            is_image,
        }
    }

    #[must_use]
    pub fn run_error(message: impl Into<String>) -> Self {
        Self::RunError {
            message: message.into(),
        }
    }

    /// Returns true when this event closes the run lifecycle on the server side.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunComplete)
    }
}

/// Event tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    pub run_id: RunId,
    pub event: AgentEvent,
}

impl RunEvent {
    #[must_use]
    pub fn new(run_id: RunId, event: AgentEvent) -> Self {
        Self { run_id, event }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }
}

/// Input required to start a server run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub run_id: RunId,
    pub message: String,
}

/// Failure of one outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("session '{session_id}' not found")]
    SessionNotFound { session_id: SessionId },

    #[error("run {run_id} rejected: {reason}")]
    RunRejected { run_id: RunId, reason: String },

    #[error("{0}")]
    Backend(String),
}

impl ServerError {
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Request surface of an agent server.
///
/// Runs are executed synchronously from the caller's perspective: `submit_run`
/// blocks while emitting events in server order and returns once the run is
/// over. Session requests are plain request/response calls.
pub trait AgentServer: Send + Sync + 'static {
    /// Stable identifier used for startup selection and logging.
    fn server_id(&self) -> &str;

    fn submit_run(
        &self,
        request: RunRequest,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), ServerError>;

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServerError>;

    /// Returns the ordered snapshot of a session and makes it the server's
    /// current session, so the next run appends to it.
    fn load_session(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError>;

    /// Starts a fresh session; the next run creates a new persisted entry.
    fn create_session(&self) -> Result<(), ServerError>;

    fn rename_session(&self, session_id: &str, new_name: &str) -> Result<(), ServerError>;

    fn delete_session(&self, session_id: &str) -> Result<(), ServerError>;
}

/// Locks `mutex`, recovering the guard if a holder panicked.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use serde_json::json;

    use super::{
        lock_unpoisoned, preview_for_task, AgentEvent, RunEvent, ServerError, SnapshotRecord,
        StepRecord, NEW_SESSION_PREVIEW,
    };

    #[test]
    fn preview_truncates_by_chars() {
        assert_eq!(preview_for_task("Hi"), "Hi...");
        let long = "é".repeat(60);
        assert_eq!(preview_for_task(&long), format!("{}...", "é".repeat(50)));
        assert_eq!(preview_for_task(""), NEW_SESSION_PREVIEW);
    }

    #[test]
    fn poisoned_lock_still_yields_its_value() {
        let shared = Arc::new(Mutex::new(7));
        let worker = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = worker.lock().expect("lock");
            panic!("worker dies holding the lock");
        })
        .join();

        assert!(shared.is_poisoned());
        assert_eq!(*lock_unpoisoned(&shared), 7);
    }

    #[test]
    fn agent_events_use_snake_case_type_tags() {
        let delta = serde_json::to_value(AgentEvent::text_delta("Thin")).expect("serialize");
        assert_eq!(delta, json!({"type": "text_delta", "content": "Thin"}));

        let complete = serde_json::to_value(AgentEvent::RunComplete).expect("serialize");
        assert_eq!(complete, json!({"type": "run_complete"}));
    }

    #[test]
    fn step_finalized_flattens_record_fields_next_to_tag() {
        let event = AgentEvent::StepFinalized(
            StepRecord::new(1)
                .with_thought("Plan")
                .with_code("print(1)")
                .with_observations("1"),
        );

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "step_finalized",
                "step_number": 1,
                "model_output": "Plan",
                "code_action": "print(1)",
                "observations": "1",
                "failed": false,
                "is_final_answer": false,
                "is_image": false,
            })
        );

        let decoded: AgentEvent = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded, event);
    }

    #[test]
    fn snapshot_records_default_missing_step_fields() {
        let record: SnapshotRecord =
            serde_json::from_value(json!({"kind": "step", "step_number": 3}))
                .expect("minimal step record");

        assert_eq!(record, SnapshotRecord::Step(StepRecord::new(3)));
    }

    #[test]
    fn failure_is_reported_by_flag_or_error_text() {
        assert!(!StepRecord::new(1).is_failed());
        assert!(StepRecord::new(1).with_error("boom").is_failed());

        let mut blank_error = StepRecord::new(1);
        blank_error.error = Some("  ".to_string());
        assert!(!blank_error.is_failed());

        let mut flagged = StepRecord::new(1);
        flagged.failed = true;
        assert!(flagged.is_failed());
    }

    #[test]
    fn only_run_complete_is_terminal() {
        assert!(RunEvent::new(1, AgentEvent::RunComplete).is_terminal());
        assert!(!RunEvent::new(1, AgentEvent::final_answer("42", false)).is_terminal());
        assert!(!RunEvent::new(1, AgentEvent::run_error("boom")).is_terminal());
        assert!(!RunEvent::new(1, AgentEvent::text_delta("x")).is_terminal());
    }

    #[test]
    fn server_error_messages_name_the_failure() {
        let error = ServerError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "session 'abc' not found");
        assert_eq!(ServerError::backend("disk full").to_string(), "disk full");
    }
}
