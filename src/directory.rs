//! Session directory view state.
//!
//! Holds the ordered session summaries shown to the user plus at most one
//! pending rename/delete request awaiting confirmation. Server calls are
//! issued by the client after [`SessionDirectory::confirm`] hands back the
//! confirmed action.

use agent_protocol::{SessionId, SessionSummary};

/// One row of the directory. The new-session row is always first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry<'a> {
    NewSession,
    Session(&'a SessionSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Rename,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: PendingKind,
    pub target: SessionId,
}

/// Action released by a successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmedAction {
    Rename { target: SessionId, new_name: String },
    Delete { target: SessionId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDirectory {
    sessions: Vec<SessionSummary>,
    pending: Option<PendingAction>,
}

impl SessionDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list with the server's summaries, in server order.
    pub fn refresh(&mut self, sessions: Vec<SessionSummary>) {
        self.sessions = sessions;
    }

    #[must_use]
    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    #[must_use]
    pub fn entries(&self) -> Vec<DirectoryEntry<'_>> {
        std::iter::once(DirectoryEntry::NewSession)
            .chain(self.sessions.iter().map(DirectoryEntry::Session))
            .collect()
    }

    #[must_use]
    pub fn find(&self, session_id: &str) -> Option<&SessionSummary> {
        self.sessions.iter().find(|summary| summary.id == session_id)
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Starts a rename request; replaces any other pending request.
    pub fn request_rename(&mut self, target: impl Into<SessionId>) {
        self.pending = Some(PendingAction {
            kind: PendingKind::Rename,
            target: target.into(),
        });
    }

    /// Starts a delete request; replaces any other pending request.
    pub fn request_delete(&mut self, target: impl Into<SessionId>) {
        self.pending = Some(PendingAction {
            kind: PendingKind::Delete,
            target: target.into(),
        });
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Resolves the pending request and always clears it.
    ///
    /// Returns `None` when nothing is pending or when a rename carries a
    /// blank name. The rename name is trimmed.
    pub fn confirm(&mut self, new_name: Option<&str>) -> Option<ConfirmedAction> {
        let pending = self.pending.take()?;
        match pending.kind {
            PendingKind::Rename => {
                let name = new_name.map(str::trim).unwrap_or_default();
                if name.is_empty() {
                    return None;
                }
                Some(ConfirmedAction::Rename {
                    target: pending.target,
                    new_name: name.to_string(),
                })
            }
            PendingKind::Delete => Some(ConfirmedAction::Delete {
                target: pending.target,
            }),
        }
    }

    /// Applies a confirmed rename locally. Returns whether the row exists.
    pub fn apply_rename(&mut self, session_id: &str, new_name: &str) -> bool {
        match self
            .sessions
            .iter_mut()
            .find(|summary| summary.id == session_id)
        {
            Some(summary) => {
                summary.preview = new_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Removes a deleted session row. Returns whether one was removed.
    pub fn remove(&mut self, session_id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|summary| summary.id != session_id);
        self.sessions.len() != before
    }
}
