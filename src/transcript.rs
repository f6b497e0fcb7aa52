//! In-memory conversation transcript.
//!
//! Invariant: a step with [`StepStatus::InProgress`] exists only as the last
//! entry, and at most one exists at any time. [`Transcript`] keeps its entry
//! list private so only the append/pop operations below can mutate it.

use agent_protocol::StepRecord;

use crate::content::{extract_thought, non_blank, ImageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    InProgress,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEntry {
    pub step_number: u32,
    pub thought: Option<String>,
    pub code_action: Option<String>,
    pub observations: Option<String>,
    pub images: Vec<ImageRef>,
    pub error: Option<String>,
    pub failed: bool,
    pub status: StepStatus,
}

impl StepEntry {
    /// Builds the finalized step for a record. Live finalization and snapshot
    /// replay both go through here.
    #[must_use]
    pub fn from_record(record: &StepRecord) -> Self {
        Self {
            step_number: record.step_number,
            thought: extract_thought(record.model_output.as_deref()),
            code_action: non_blank(record.code_action.as_deref()),
            observations: non_blank(record.observations.as_deref()),
            images: record
                .images
                .iter()
                .map(|image| ImageRef::normalize(image))
                .collect(),
            error: non_blank(record.error.as_deref()),
            failed: record.is_failed(),
            status: StepStatus::Finalized,
        }
    }

    /// Empty step standing in for a placeholder while tokens stream.
    #[must_use]
    pub fn in_progress(step_number: u32) -> Self {
        Self {
            step_number,
            thought: None,
            code_action: None,
            observations: None,
            images: Vec::new(),
            error: None,
            failed: false,
            status: StepStatus::InProgress,
        }
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == StepStatus::InProgress
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    UserMessage { text: String },
    Step(StepEntry),
    FinalAnswer { content: String, is_image: bool },
    SystemError { message: String },
}

impl TranscriptEntry {
    #[must_use]
    pub fn as_step(&self) -> Option<&StepEntry> {
        match self {
            Self::Step(step) => Some(step),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_in_progress_step(&self) -> bool {
        self.as_step().is_some_and(StepEntry::is_in_progress)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn has_in_progress_tail(&self) -> bool {
        self.entries
            .last()
            .is_some_and(TranscriptEntry::is_in_progress_step)
    }

    /// Highest step number among entries, in-progress placeholders excluded.
    #[must_use]
    pub fn last_step_number(&self) -> Option<u32> {
        self.entries.iter().rev().find_map(|entry| match entry {
            TranscriptEntry::Step(step) if !step.is_in_progress() => Some(step.step_number),
            _ => None,
        })
    }

    /// Appends a finalized entry and returns its index.
    ///
    /// # Panics
    ///
    /// Panics when `entry` is an in-progress step or when an in-progress step
    /// is still at the tail; callers settle the placeholder first.
    pub fn push(&mut self, entry: TranscriptEntry) -> usize {
        assert!(
            !entry.is_in_progress_step(),
            "in-progress steps are opened with open_in_progress"
        );
        assert!(
            !self.has_in_progress_tail(),
            "placeholder must be settled before appending"
        );

        if let TranscriptEntry::Step(step) = &entry {
            if let Some(previous) = self.last_step_number() {
                if step.step_number <= previous {
                    tracing::warn!(
                        step_number = step.step_number,
                        previous,
                        "step number does not increase; accepting at face value"
                    );
                }
            }
        }

        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Opens the single in-progress step at the tail. Returns false when one
    /// already exists.
    pub fn open_in_progress(&mut self, step_number: u32) -> bool {
        if self.has_in_progress_tail() {
            return false;
        }

        self.entries
            .push(TranscriptEntry::Step(StepEntry::in_progress(step_number)));
        true
    }

    /// Removes the in-progress tail step. Returns whether one was removed.
    pub fn discard_in_progress(&mut self) -> bool {
        if !self.has_in_progress_tail() {
            return false;
        }

        self.entries.pop();
        true
    }

    /// Wholesale replacement used when switching sessions.
    pub fn replace(&mut self, entries: Vec<TranscriptEntry>) {
        debug_assert!(
            entries.iter().all(|entry| !entry.is_in_progress_step()),
            "replacement entries are finalized"
        );
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Checks the placeholder invariant: at most one in-progress step, and
    /// only at the tail.
    #[must_use]
    pub fn in_progress_invariant_holds(&self) -> bool {
        let in_progress = self
            .entries
            .iter()
            .filter(|entry| entry.is_in_progress_step())
            .count();

        match in_progress {
            0 => true,
            1 => self.has_in_progress_tail(),
            _ => false,
        }
    }
}
