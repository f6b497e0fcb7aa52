//! JSONL persistence for agent sessions.
//!
//! One file per session: a header line followed by one line per snapshot
//! record, in order. [`SessionDirectoryStore`] lists and manages every session
//! file under a root directory.

mod directory;
mod error;
mod paths;
mod schema;
mod store;

pub use directory::SessionDirectoryStore;
pub use error::SessionStoreError;
pub use paths::{session_file_name, session_root};
pub use agent_protocol::{preview_for_task, NEW_SESSION_PREVIEW, PREVIEW_CHAR_LIMIT};
pub use schema::SessionHeader;
pub use store::SessionStore;
