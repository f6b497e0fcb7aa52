//! Transcript reconciliation for streaming multi-step agent clients.
//!
//! Invariant: at most one in-progress step exists in a transcript, and only at
//! its tail. Only finalized step records produce persistent step content.
//!
//! # Public API Overview
//! - Drive a transcript from run events or a persisted snapshot via
//!   [`ReconciliationEngine`] (or the pure [`reduce`]).
//! - Materialize the returned [`RenderInstruction`]s with a [`Renderer`];
//!   [`TextRenderer`] is the plain-text implementation.
//! - Track past sessions and confirm rename/delete requests with
//!   [`SessionDirectory`].
//! - Read environment configuration with [`EnvConfig`] and install logging with
//!   [`logging::init_tracing`].

pub mod config;
pub mod content;
pub mod directory;
pub mod engine;
pub mod logging;
pub mod render;
pub mod transcript;

/// Shared event and snapshot vocabulary.
pub use agent_protocol::{AgentEvent, SessionSummary, SnapshotRecord, StepRecord};

/// Environment configuration.
pub use crate::config::{ConfigError, EnvConfig};
/// Text field and image helpers.
pub use crate::content::{extract_thought, ImageRef};
/// Session directory state.
pub use crate::directory::{
    ConfirmedAction, DirectoryEntry, PendingAction, PendingKind, SessionDirectory,
};
/// Reconciliation engine.
pub use crate::engine::{
    reduce, EngineConfig, EngineInput, EngineState, GenerationState, ReconciliationEngine,
    StreamingBuffer, DEFAULT_TOOL_HINT_THRESHOLD,
};
/// Render instructions and renderers.
pub use crate::render::{Placeholder, RenderInstruction, Renderer, StepView, TextRenderer};
/// Transcript model.
pub use crate::transcript::{StepEntry, StepStatus, Transcript, TranscriptEntry};
