//! Newline-delimited JSON framing for agent server messages.
//!
//! This crate decodes the server's wire frames into the shared
//! [`agent_protocol`] vocabulary. It accepts both the canonical event names
//! (`text_delta`, `step_finalized`, `run_error`, ...) and the legacy names a
//! server may still emit (`stream_delta`, `action_step`, `error`, ...), and
//! normalizes them into one [`WireMessage`] shape.
//!
//! Frames that fail to decode are skipped and counted; a single bad line never
//! stops the stream.

pub mod error;
pub mod events;
pub mod frames;

pub use error::WireError;
pub use events::{decode_value, encode_event, step_record_from_value, WireMessage};
pub use frames::{decode_line, FrameParser};
