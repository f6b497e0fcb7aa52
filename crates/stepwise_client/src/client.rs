//! Client state machine: routes user input, run events and session requests
//! through the reconciliation engine and the session directory.

use std::fmt::Write as _;

use agent_protocol::{RunEvent, RunId, ServerError, SessionId, SessionSummary, SnapshotRecord};
use stepwise::{
    ConfirmedAction, DirectoryEntry, EngineConfig, PendingKind, ReconciliationEngine,
    RenderInstruction, SessionDirectory, Transcript,
};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};

/// Side effects the client asks of its host.
pub trait ServerOps {
    fn start_run(&mut self, message: String) -> Result<RunId, ServerError>;
    fn list_sessions(&mut self) -> Result<Vec<SessionSummary>, ServerError>;
    fn load_session(&mut self, session_id: &str) -> Result<Vec<SnapshotRecord>, ServerError>;
    fn create_session(&mut self) -> Result<(), ServerError>;
    fn rename_session(&mut self, session_id: &str, new_name: &str) -> Result<(), ServerError>;
    fn delete_session(&mut self, session_id: &str) -> Result<(), ServerError>;
    fn request_render(&mut self);
    fn request_stop(&mut self);
}

/// Which session is shown and which run may still write to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub active_session: Option<SessionId>,
    pub active_run: Option<RunId>,
}

const RUN_IN_PROGRESS: &str = "A run is already in progress.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    engine: ReconciliationEngine,
    directory: SessionDirectory,
    context: ClientContext,
    pending_render: Vec<RenderInstruction>,
    notices: Vec<String>,
    pub input: String,
    pub should_exit: bool,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Client {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: ReconciliationEngine::new(config),
            directory: SessionDirectory::new(),
            context: ClientContext::default(),
            pending_render: Vec::new(),
            notices: Vec::new(),
            input: String::new(),
            should_exit: false,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn transcript(&self) -> &Transcript {
        self.engine.transcript()
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn is_generating(&self) -> bool {
        self.engine.is_generating()
    }

    pub fn on_input_replace(&mut self, text: String) {
        self.input = text;
    }

    /// Render instructions produced since the last call, in order.
    pub fn take_render_instructions(&mut self) -> Vec<RenderInstruction> {
        std::mem::take(&mut self.pending_render)
    }

    /// Out-of-transcript messages for the user (help, listings, rejections).
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn on_submit(&mut self, host: &mut dyn ServerOps) {
        let submitted = std::mem::take(&mut self.input);
        let message = submitted.trim().to_string();

        if message.is_empty() {
            host.request_render();
            return;
        }

        if let Some(command) = parse_slash_command(&message) {
            self.on_command(command, host);
            host.request_render();
            return;
        }

        if self.engine.is_generating() {
            tracing::debug!("submission rejected while generating");
            self.notice(RUN_IN_PROGRESS);
            host.request_render();
            return;
        }

        let instructions = self.engine.push_user_message(&message);
        self.emit(instructions);
        self.engine.begin_run();

        match host.start_run(message) {
            Ok(run_id) => self.context.active_run = Some(run_id),
            Err(error) => self.fail_run(&error),
        }

        host.request_render();
    }

    /// Applies one run event if it belongs to the active run.
    pub fn on_run_event(&mut self, event: RunEvent, host: &mut dyn ServerOps) {
        if self.context.active_run != Some(event.run_id) {
            tracing::debug!(
                run_id = event.run_id,
                active_run = ?self.context.active_run,
                "dropping event for inactive run"
            );
            return;
        }

        let terminal = event.is_terminal();
        let instructions = self.engine.apply(&event.event);
        let refresh = instructions.contains(&RenderInstruction::RefreshSessionList);
        self.emit(instructions);

        if terminal {
            self.context.active_run = None;
        }
        if refresh {
            self.refresh(host);
            self.adopt_newest_session();
        }

        host.request_render();
    }

    pub fn refresh(&mut self, host: &mut dyn ServerOps) {
        match host.list_sessions() {
            Ok(sessions) => self.directory.refresh(sessions),
            Err(error) => self.report_server_error(&error),
        }
    }

    /// Switches to a past session. Events of the run in flight are dropped
    /// from here on.
    pub fn select(&mut self, session_id: &str, host: &mut dyn ServerOps) {
        match host.load_session(session_id) {
            Ok(records) => {
                self.abandon_active_run();
                let instructions = self.engine.load_from_snapshot(&records);
                self.emit(instructions);
                self.context.active_session = Some(session_id.to_string());
                tracing::info!(session_id, records = records.len(), "switched session");
            }
            Err(error) => self.report_server_error(&error),
        }

        host.request_render();
    }

    pub fn create(&mut self, host: &mut dyn ServerOps) {
        match host.create_session() {
            Ok(()) => {
                self.abandon_active_run();
                let instructions = self.engine.clear();
                self.emit(instructions);
                self.context.active_session = None;
                tracing::info!("started new session");
            }
            Err(error) => self.report_server_error(&error),
        }

        host.request_render();
    }

    /// Renames a session. Blank names are ignored.
    pub fn rename(&mut self, session_id: &str, new_name: &str, host: &mut dyn ServerOps) {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return;
        }

        match host.rename_session(session_id, new_name) {
            Ok(()) => {
                self.directory.apply_rename(session_id, new_name);
            }
            Err(error) => self.report_server_error(&error),
        }
    }

    /// Deletes a session. The transcript stays as it is even when the deleted
    /// session is the one shown; only the active-session pointer is cleared.
    pub fn delete(&mut self, session_id: &str, host: &mut dyn ServerOps) {
        match host.delete_session(session_id) {
            Ok(()) => {
                self.directory.remove(session_id);
                if self.context.active_session.as_deref() == Some(session_id) {
                    self.context.active_session = None;
                    tracing::info!(session_id, "deleted the active session");
                }
            }
            Err(error) => self.report_server_error(&error),
        }
    }

    pub fn request_rename(&mut self, session_id: &str) {
        if self.directory.find(session_id).is_none() {
            self.notice(format!("Unknown session: {session_id}"));
            return;
        }

        self.directory.request_rename(session_id);
        self.notice(format!(
            "Rename {session_id}: /confirm <new name> or /cancel-action"
        ));
    }

    pub fn request_delete(&mut self, session_id: &str) {
        if self.directory.find(session_id).is_none() {
            self.notice(format!("Unknown session: {session_id}"));
            return;
        }

        self.directory.request_delete(session_id);
        self.notice(format!("Delete {session_id}? /confirm or /cancel-action"));
    }

    pub fn confirm(&mut self, new_name: Option<&str>, host: &mut dyn ServerOps) {
        match self.directory.confirm(new_name) {
            Some(ConfirmedAction::Rename { target, new_name }) => {
                self.rename(&target, &new_name, host);
            }
            Some(ConfirmedAction::Delete { target }) => self.delete(&target, host),
            None => self.notice("Nothing confirmed."),
        }
    }

    pub fn cancel_action(&mut self) {
        self.directory.cancel();
    }

    pub fn on_quit(&mut self, host: &mut dyn ServerOps) {
        self.should_exit = true;
        host.request_stop();
    }

    /// Directory listing with the active session marked and any pending action.
    pub fn session_listing(&self) -> String {
        let mut out = String::from("Sessions:");
        for entry in self.directory.entries() {
            match entry {
                DirectoryEntry::NewSession => out.push_str("\n  + New Chat (/new)"),
                DirectoryEntry::Session(summary) => {
                    let marker = if self.context.active_session.as_deref() == Some(summary.id.as_str()) {
                        '*'
                    } else {
                        ' '
                    };
                    let _ = write!(
                        out,
                        "\n  {marker} {}  {}  {}",
                        summary.id, summary.timestamp, summary.preview
                    );
                }
            }
        }

        if let Some(pending) = self.directory.pending() {
            let kind = match pending.kind {
                PendingKind::Rename => "rename",
                PendingKind::Delete => "delete",
            };
            let _ = write!(out, "\nPending {kind} of {}", pending.target);
        }
        out
    }

    fn on_command(&mut self, command: SlashCommand, host: &mut dyn ServerOps) {
        match command {
            SlashCommand::Help => self.notice(HELP_TEXT),
            SlashCommand::New => self.create(host),
            SlashCommand::Sessions => {
                self.refresh(host);
                let listing = self.session_listing();
                self.notice(listing);
            }
            SlashCommand::Load(session_id) => self.select(&session_id, host),
            SlashCommand::Rename(session_id) => self.request_rename(&session_id),
            SlashCommand::Delete(session_id) => self.request_delete(&session_id),
            SlashCommand::Confirm(new_name) => self.confirm(new_name.as_deref(), host),
            SlashCommand::CancelAction => {
                self.cancel_action();
                self.notice("Cancelled.");
            }
            SlashCommand::Quit => self.on_quit(host),
            SlashCommand::MissingArgument(usage) => self.notice(format!("Usage: {usage}")),
            SlashCommand::Unknown(command) => self.notice(format!("Unknown command: {command}")),
        }
    }

    /// A run that finished without a selected session created one; servers
    /// list it first.
    fn adopt_newest_session(&mut self) {
        if self.context.active_session.is_some() {
            return;
        }

        if let Some(newest) = self.directory.sessions().first() {
            self.context.active_session = Some(newest.id.clone());
        }
    }

    fn abandon_active_run(&mut self) {
        if let Some(run_id) = self.context.active_run.take() {
            tracing::debug!(run_id, "abandoning active run");
        }
    }

    /// The run never started: report it and go back to idle.
    fn fail_run(&mut self, error: &ServerError) {
        tracing::warn!(%error, "run failed to start");
        self.context.active_run = None;
        let instructions = self.engine.on_error(&error.to_string());
        self.emit(instructions);
    }

    /// A session request failed. The error lands in the transcript; a run in
    /// flight keeps streaming into it.
    fn report_server_error(&mut self, error: &ServerError) {
        tracing::warn!(%error, active_run = ?self.context.active_run, "server request failed");
        let instructions = self.engine.push_system_error(&error.to_string());
        self.emit(instructions);
    }

    fn emit(&mut self, instructions: Vec<RenderInstruction>) {
        self.pending_render.extend(instructions);
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.notices.push(text.into());
    }
}
