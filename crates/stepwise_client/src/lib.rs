//! Terminal client for a streaming multi-step agent server.
//!
//! ## Server bootstrap
//!
//! The server is chosen at startup with `STEPWISE_SERVER`:
//!
//! - `local` (default): scripted runs persisted as JSONL session files under
//!   `STEPWISE_SESSION_DIR`, or `<cwd>/.stepwise/sessions` when unset
//! - `mock`: the same scripted runs with in-memory sessions
//! - `recorded:<path>`: replays a captured NDJSON stream on every run
//!
//! ## Event flow
//!
//! Each run executes on a worker thread owned by
//! [`runtime::RuntimeController`]. Events are tagged with their run id and
//! queued; the owning thread applies them to [`client::Client`], which drops
//! every event whose run is no longer active. Switching or creating a session
//! abandons the run in flight this way.

pub mod client;
pub mod commands;
pub mod console;
pub mod runtime;
pub mod servers;
