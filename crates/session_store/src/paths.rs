use std::path::{Path, PathBuf};

pub const SESSION_DIR: [&str; 2] = [".stepwise", "sessions"];
pub const SESSION_FILE_EXTENSION: &str = "jsonl";

#[must_use]
pub fn session_root(cwd: &Path) -> PathBuf {
    cwd.join(SESSION_DIR[0]).join(SESSION_DIR[1])
}

#[must_use]
pub fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn session_file_name(created_at: &str, session_id: &str) -> String {
    format!(
        "{}_{}.{SESSION_FILE_EXTENSION}",
        sanitize_timestamp_for_filename(created_at),
        session_id
    )
}

/// Whether `path` names a session file (not a pending temp file).
pub(crate) fn is_session_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(SESSION_FILE_EXTENSION)
}

/// Whether a session file name belongs to `session_id`.
pub(crate) fn file_matches_session(path: &Path, session_id: &str) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(&format!("_{session_id}")))
}
