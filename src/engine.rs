//! Transcript reconciliation engine.
//!
//! Applies run events (live, token by token) or a persisted snapshot (in bulk)
//! to a [`Transcript`] and returns the render instructions for each step.
//! Both paths build finalized steps through [`StepEntry::from_record`], so a
//! replayed snapshot matches what live streaming of the same run produced.
//!
//! The only streaming state is the optional [`StreamingBuffer`]; it exists
//! exactly while the transcript tail is an in-progress step.

use agent_protocol::{AgentEvent, SnapshotRecord, StepRecord};

use crate::render::{Placeholder, RenderInstruction, StepView};
use crate::transcript::{StepEntry, Transcript, TranscriptEntry};

/// Buffer length (in chars) at or above which a tool hint no longer replaces
/// the placeholder text.
pub const DEFAULT_TOOL_HINT_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationState {
    #[default]
    Idle,
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub tool_hint_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_hint_threshold: DEFAULT_TOOL_HINT_THRESHOLD,
        }
    }
}

/// Raw token text of the in-progress step plus the last announced tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingBuffer {
    text: String,
    current_tool: Option<String>,
}

impl StreamingBuffer {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn current_tool(&self) -> Option<&str> {
        self.current_tool.as_deref()
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Input accepted by [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    Event(AgentEvent),
    Snapshot(Vec<SnapshotRecord>),
}

/// Engine state threaded through [`reduce`].
///
/// Fields are private: a streaming buffer exists exactly when the transcript
/// ends in an in-progress step, and only the engine operations keep the two
/// in step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    transcript: Transcript,
    streaming: Option<StreamingBuffer>,
    generation: GenerationState,
    config: EngineConfig,
}

impl EngineState {
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn streaming(&self) -> Option<&StreamingBuffer> {
        self.streaming.as_ref()
    }

    #[must_use]
    pub fn generation(&self) -> GenerationState {
        self.generation
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Pure form of the engine: `(state, input) -> (state, instructions)`.
#[must_use]
pub fn reduce(state: EngineState, input: EngineInput) -> (EngineState, Vec<RenderInstruction>) {
    let mut engine = ReconciliationEngine { state };
    let instructions = engine.apply_input(input);
    (engine.state, instructions)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationEngine {
    state: EngineState,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: EngineState::with_config(config),
        }
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> EngineState {
        self.state
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.state.transcript
    }

    #[must_use]
    pub fn generation(&self) -> GenerationState {
        self.state.generation
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.state.generation == GenerationState::Generating
    }

    #[must_use]
    pub fn streaming(&self) -> Option<&StreamingBuffer> {
        self.state.streaming.as_ref()
    }

    pub fn apply_input(&mut self, input: EngineInput) -> Vec<RenderInstruction> {
        match input {
            EngineInput::Event(event) => self.apply(&event),
            EngineInput::Snapshot(records) => self.load_from_snapshot(&records),
        }
    }

    pub fn apply(&mut self, event: &AgentEvent) -> Vec<RenderInstruction> {
        match event {
            AgentEvent::TextDelta { content } => self.on_text_delta(content),
            AgentEvent::ToolStart { tool_name, .. } => self.on_tool_start(tool_name),
            AgentEvent::StepFinalized(record) => self.on_step_finalized(record),
            AgentEvent::FinalAnswer { content, is_image } => {
                self.on_final_answer(content, *is_image)
            }
            AgentEvent::RunError { message } => self.on_error(message),
            AgentEvent::RunComplete => self.on_run_complete(),
        }
    }

    /// Enters `Generating`. Returns false when a run is already generating.
    pub fn begin_run(&mut self) -> bool {
        if self.is_generating() {
            return false;
        }

        self.state.generation = GenerationState::Generating;
        true
    }

    /// Appends the submitted user message, settling any leftover placeholder.
    pub fn push_user_message(&mut self, text: &str) -> Vec<RenderInstruction> {
        let mut out = Vec::new();
        if self.settle_placeholder() {
            out.push(RenderInstruction::RemovePlaceholder);
        }

        self.state.transcript.push(TranscriptEntry::UserMessage {
            text: text.to_string(),
        });
        out.push(RenderInstruction::AppendUserMessage {
            text: text.to_string(),
        });
        out.push(RenderInstruction::ScrollToEnd);
        out
    }

    /// Appends a client-side error entry without touching generation state.
    pub fn push_system_error(&mut self, message: &str) -> Vec<RenderInstruction> {
        let mut out = Vec::new();
        if self.settle_placeholder() {
            out.push(RenderInstruction::RemovePlaceholder);
        }

        self.state.transcript.push(TranscriptEntry::SystemError {
            message: message.to_string(),
        });
        out.push(RenderInstruction::AppendError {
            message: message.to_string(),
        });
        out.push(RenderInstruction::ScrollToEnd);
        out
    }

    pub fn on_text_delta(&mut self, text: &str) -> Vec<RenderInstruction> {
        let mut out = Vec::new();
        let buffer = self.ensure_placeholder(&mut out);
        buffer.text.push_str(text);
        out.push(RenderInstruction::UpdatePlaceholderText {
            text: buffer.text.clone(),
        });
        out.push(RenderInstruction::ScrollToEnd);
        out
    }

    /// Best-effort hint: never becomes part of a finalized step.
    pub fn on_tool_start(&mut self, tool_name: &str) -> Vec<RenderInstruction> {
        let threshold = self.state.config.tool_hint_threshold;
        let mut out = Vec::new();
        let buffer = self.ensure_placeholder(&mut out);
        buffer.current_tool = Some(tool_name.to_string());

        if buffer.char_len() < threshold {
            out.push(RenderInstruction::ShowPlaceholder(Placeholder::CallingTool {
                tool_name: tool_name.to_string(),
            }));
            out.push(RenderInstruction::ScrollToEnd);
        }

        out
    }

    /// Authoritative step completion; does not depend on a placeholder existing.
    pub fn on_step_finalized(&mut self, record: &StepRecord) -> Vec<RenderInstruction> {
        let mut out = Vec::new();
        if self.settle_placeholder() {
            out.push(RenderInstruction::RemovePlaceholder);
        }

        let step = StepEntry::from_record(record);
        out.push(RenderInstruction::AppendStep(StepView::from_step(&step)));
        out.push(RenderInstruction::ScrollToEnd);
        self.state.transcript.push(TranscriptEntry::Step(step));
        out
    }

    pub fn on_final_answer(&mut self, content: &str, is_image: bool) -> Vec<RenderInstruction> {
        let mut out = Vec::new();
        if self.settle_placeholder() {
            out.push(RenderInstruction::RemovePlaceholder);
        }

        if self.state.transcript.last_step_number().is_none() {
            tracing::warn!("final answer arrived with no preceding steps");
        }

        self.state.transcript.push(TranscriptEntry::FinalAnswer {
            content: content.to_string(),
            is_image,
        });
        self.state.generation = GenerationState::Idle;

        out.push(RenderInstruction::AppendFinalAnswer {
            content: content.to_string(),
            is_image,
        });
        out.push(RenderInstruction::ScrollToEnd);
        out.push(RenderInstruction::RefreshSessionList);
        out
    }

    pub fn on_error(&mut self, message: &str) -> Vec<RenderInstruction> {
        let out = self.push_system_error(message);
        self.state.generation = GenerationState::Idle;
        out
    }

    /// Pure completion signal; safe to receive while already idle.
    pub fn on_run_complete(&mut self) -> Vec<RenderInstruction> {
        self.state.generation = GenerationState::Idle;
        Vec::new()
    }

    /// Wholesale rebuild from a persisted snapshot.
    pub fn load_from_snapshot(&mut self, records: &[SnapshotRecord]) -> Vec<RenderInstruction> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            match record {
                SnapshotRecord::Task { task } => {
                    entries.push(TranscriptEntry::UserMessage { text: task.clone() });
                }
                SnapshotRecord::Step(step) => {
                    entries.push(TranscriptEntry::Step(StepEntry::from_record(step)));
                    if step.is_final_answer {
                        entries.push(TranscriptEntry::FinalAnswer {
                            content: step.action_output.clone().unwrap_or_default(),
                            is_image: step.is_image,
                        });
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(entries.len() + 2);
        out.push(RenderInstruction::ClearTranscript);
        out.extend(entries.iter().map(RenderInstruction::append_entry));
        out.push(RenderInstruction::ScrollToEnd);

        self.state.streaming = None;
        self.state.transcript.replace(entries);
        self.state.generation = GenerationState::Idle;
        out
    }

    /// Empties the transcript for a fresh session.
    pub fn clear(&mut self) -> Vec<RenderInstruction> {
        self.state.streaming = None;
        self.state.transcript.clear();
        self.state.generation = GenerationState::Idle;
        vec![RenderInstruction::ClearTranscript]
    }

    fn ensure_placeholder(&mut self, out: &mut Vec<RenderInstruction>) -> &mut StreamingBuffer {
        if self.state.streaming.is_none() {
            let provisional = self
                .state
                .transcript
                .last_step_number()
                .map_or(1, |number| number.saturating_add(1));
            self.state.transcript.open_in_progress(provisional);
            out.push(RenderInstruction::ShowPlaceholder(Placeholder::Thinking));
        }

        self.state
            .streaming
            .get_or_insert_with(StreamingBuffer::default)
    }

    /// Drops the buffer and its in-progress entry. Returns whether one existed.
    fn settle_placeholder(&mut self) -> bool {
        let had_buffer = self.state.streaming.take().is_some();
        let had_entry = self.state.transcript.discard_in_progress();
        had_buffer || had_entry
    }
}
