use std::fs;
use std::path::{Path, PathBuf};

use agent_protocol::SessionSummary;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SessionStoreError;
use crate::paths::{file_matches_session, is_session_file};
use crate::store::SessionStore;

/// Every session file under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDirectoryStore {
    root: PathBuf,
}

impl SessionDirectoryStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create(&self) -> Result<SessionStore, SessionStoreError> {
        SessionStore::create_new(&self.root)
    }

    /// Summaries of all readable sessions, most recently updated first.
    ///
    /// Unreadable files are logged and skipped. A missing root lists nothing.
    pub fn list(&self) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let mut headers = Vec::new();
        for path in self.session_files()? {
            match SessionStore::open(&path) {
                Ok(store) => headers.push(store.header().clone()),
                Err(error) => tracing::warn!(%error, "skipping unreadable session file"),
            }
        }

        headers.sort_by(|a, b| {
            parse_timestamp(&b.updated_at)
                .cmp(&parse_timestamp(&a.updated_at))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(headers.iter().map(|header| header.summary()).collect())
    }

    pub fn find(&self, session_id: &str) -> Result<SessionStore, SessionStoreError> {
        for path in self.session_files()? {
            if !file_matches_session(&path, session_id) {
                continue;
            }

            let store = SessionStore::open(&path)?;
            if store.session_id() == session_id {
                return Ok(store);
            }
        }

        Err(SessionStoreError::SessionNotFound {
            root: self.root.clone(),
            session_id: session_id.to_string(),
        })
    }

    pub fn rename(&self, session_id: &str, new_name: &str) -> Result<SessionSummary, SessionStoreError> {
        let mut store = self.find(session_id)?;
        store.set_preview(new_name)?;
        Ok(store.summary())
    }

    pub fn delete(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let store = self.find(session_id)?;
        fs::remove_file(store.path())
            .map_err(|source| SessionStoreError::io("deleting session file", store.path(), source))
    }

    fn session_files(&self) -> Result<Vec<PathBuf>, SessionStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SessionStoreError::io(
                    "listing session root",
                    &self.root,
                    source,
                ))
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| SessionStoreError::io("listing session root", &self.root, source))?;
            let path = entry.path();
            if path.is_file() && is_session_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}
