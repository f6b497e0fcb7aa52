//! Render instructions handed to the presentation layer.
//!
//! The engine never touches a presentation layer directly. Each operation
//! returns an ordered list of [`RenderInstruction`]s that a [`Renderer`]
//! materializes. [`TextRenderer`] is the plain-text materializer the CLI uses.

use std::fmt::Write as _;

use crate::content::ImageRef;
use crate::transcript::{StepEntry, TranscriptEntry};

/// Transient indicator shown while a step is still streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Thinking,
    CallingTool { tool_name: String },
}

/// Render-ready projection of a finalized step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepView {
    pub step_number: u32,
    pub title: String,
    pub thought: Option<String>,
    /// Code action wrapped as a fenced `python` block.
    pub code_block: Option<String>,
    pub observations: Option<String>,
    pub images: Vec<ImageRef>,
    pub error: Option<String>,
    pub failed: bool,
}

impl StepView {
    #[must_use]
    pub fn from_step(step: &StepEntry) -> Self {
        let title = if step.failed {
            format!("Step {} (Failed)", step.step_number)
        } else {
            format!("Step {}", step.step_number)
        };

        Self {
            step_number: step.step_number,
            title,
            thought: step.thought.clone(),
            code_block: step
                .code_action
                .as_deref()
                .map(|code| format!("```python\n{code}\n```")),
            observations: step.observations.clone(),
            images: step.images.clone(),
            error: step.error.clone(),
            failed: step.failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderInstruction {
    ShowPlaceholder(Placeholder),
    UpdatePlaceholderText { text: String },
    RemovePlaceholder,
    AppendUserMessage { text: String },
    AppendStep(StepView),
    AppendFinalAnswer { content: String, is_image: bool },
    AppendError { message: String },
    ClearTranscript,
    RefreshSessionList,
    ScrollToEnd,
}

impl RenderInstruction {
    /// Instruction that appends an already finalized transcript entry.
    ///
    /// # Panics
    ///
    /// Panics for in-progress steps, which are rendered only as placeholders.
    #[must_use]
    pub fn append_entry(entry: &TranscriptEntry) -> Self {
        match entry {
            TranscriptEntry::UserMessage { text } => Self::AppendUserMessage { text: text.clone() },
            TranscriptEntry::Step(step) => {
                assert!(!step.is_in_progress(), "placeholders are not appended");
                Self::AppendStep(StepView::from_step(step))
            }
            TranscriptEntry::FinalAnswer { content, is_image } => Self::AppendFinalAnswer {
                content: content.clone(),
                is_image: *is_image,
            },
            TranscriptEntry::SystemError { message } => Self::AppendError {
                message: message.clone(),
            },
        }
    }
}

/// Presentation-layer collaborator.
pub trait Renderer {
    fn apply(&mut self, instruction: &RenderInstruction);

    fn apply_all(&mut self, instructions: &[RenderInstruction]) {
        for instruction in instructions {
            self.apply(instruction);
        }
    }
}

/// Plain-text renderer that keeps finalized blocks plus one live placeholder line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextRenderer {
    blocks: Vec<String>,
    placeholder: Option<String>,
    refresh_requests: usize,
}

impl TextRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    #[must_use]
    pub fn refresh_requests(&self) -> usize {
        self.refresh_requests
    }

    /// Full text view: finalized blocks followed by the live placeholder.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.blocks.join("\n\n");
        if let Some(placeholder) = &self.placeholder {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(placeholder);
        }
        out
    }
}

impl Renderer for TextRenderer {
    fn apply(&mut self, instruction: &RenderInstruction) {
        match instruction {
            RenderInstruction::ShowPlaceholder(Placeholder::Thinking) => {
                self.placeholder = Some("Thinking...".to_string());
            }
            RenderInstruction::ShowPlaceholder(Placeholder::CallingTool { tool_name }) => {
                self.placeholder = Some(format!("Calling {tool_name}..."));
            }
            RenderInstruction::UpdatePlaceholderText { text } => {
                self.placeholder = Some(text.clone());
            }
            RenderInstruction::RemovePlaceholder => self.placeholder = None,
            RenderInstruction::AppendUserMessage { text } => {
                self.blocks.push(format!("> {text}"));
            }
            RenderInstruction::AppendStep(view) => self.blocks.push(format_step(view)),
            RenderInstruction::AppendFinalAnswer { content, is_image } => {
                if *is_image {
                    let image = ImageRef::normalize(content);
                    self.blocks.push(format!("Final Answer:\n[image] {image}"));
                } else {
                    self.blocks.push(format!("Final Answer:\n{content}"));
                }
            }
            RenderInstruction::AppendError { message } => {
                self.blocks.push(format!("Error: {message}"));
            }
            RenderInstruction::ClearTranscript => {
                self.blocks.clear();
                self.placeholder = None;
            }
            RenderInstruction::RefreshSessionList => self.refresh_requests += 1,
            RenderInstruction::ScrollToEnd => {}
        }
    }
}

fn format_step(view: &StepView) -> String {
    let mut out = format!("## {}", view.title);

    if let Some(thought) = &view.thought {
        let _ = write!(out, "\n{thought}");
    }
    if let Some(code) = &view.code_block {
        let _ = write!(out, "\n{code}");
    }
    if let Some(observations) = &view.observations {
        let _ = write!(out, "\nObservation:\n{observations}");
    }
    for image in &view.images {
        if image.is_inline() {
            let _ = write!(out, "\n[image] inline ({} bytes)", image.as_str().len());
        } else {
            let _ = write!(out, "\n[image] {image}");
        }
    }
    if let Some(error) = &view.error {
        let _ = write!(out, "\nError: {error}");
    }

    out
}

#[cfg(test)]
mod tests {
    use agent_protocol::StepRecord;

    use super::{Placeholder, RenderInstruction, Renderer, StepView, TextRenderer};
    use crate::transcript::StepEntry;

    #[test]
    fn step_view_fences_code_and_titles_failures() {
        let step = StepEntry::from_record(
            &StepRecord::new(4)
                .with_code("print(1)")
                .with_error("boom"),
        );
        let view = StepView::from_step(&step);

        assert_eq!(view.title, "Step 4 (Failed)");
        assert_eq!(view.code_block.as_deref(), Some("```python\nprint(1)\n```"));
        assert!(view.failed);
    }

    #[test]
    fn text_renderer_replaces_placeholder_with_step() {
        let mut renderer = TextRenderer::new();
        renderer.apply_all(&[
            RenderInstruction::ShowPlaceholder(Placeholder::Thinking),
            RenderInstruction::UpdatePlaceholderText {
                text: "Thinking about it".to_string(),
            },
        ]);
        assert_eq!(renderer.placeholder(), Some("Thinking about it"));

        let step = StepEntry::from_record(&StepRecord::new(1).with_thought("Plan").with_observations("1"));
        renderer.apply_all(&[
            RenderInstruction::RemovePlaceholder,
            RenderInstruction::AppendStep(StepView::from_step(&step)),
        ]);

        assert_eq!(renderer.placeholder(), None);
        assert_eq!(renderer.render(), "## Step 1\nPlan\nObservation:\n1");
    }

    #[test]
    fn text_renderer_labels_tool_placeholder_and_counts_refreshes() {
        let mut renderer = TextRenderer::new();
        renderer.apply(&RenderInstruction::ShowPlaceholder(Placeholder::CallingTool {
            tool_name: "web_search".to_string(),
        }));
        assert_eq!(renderer.placeholder(), Some("Calling web_search..."));

        renderer.apply(&RenderInstruction::RefreshSessionList);
        renderer.apply(&RenderInstruction::ClearTranscript);
        assert_eq!(renderer.refresh_requests(), 1);
        assert_eq!(renderer.render(), "");
    }
}
