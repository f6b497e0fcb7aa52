use std::thread;
use std::time::Duration;

use agent_protocol::{AgentEvent, StepRecord};

/// Characters per emitted text delta.
pub const DELTA_CHUNK_CHARS: usize = 4;

/// One scripted reasoning/action step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedStep {
    pub thought: String,
    pub code: String,
    pub tool: Option<String>,
    pub observations: Option<String>,
    pub error: Option<String>,
    pub images: Vec<String>,
}

impl ScriptedStep {
    #[must_use]
    pub fn new(thought: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            code: code.into(),
            tool: None,
            observations: None,
            error: None,
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn calling(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    #[must_use]
    pub fn observing(mut self, observations: impl Into<String>) -> Self {
        self.observations = Some(observations.into());
        self
    }

    #[must_use]
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    /// Raw model output as streamed: thought followed by the code markup.
    #[must_use]
    pub fn model_output(&self) -> String {
        format!("{}\n<code>\n{}\n</code>", self.thought, self.code)
    }

    fn record(&self, step_number: u32) -> StepRecord {
        let mut record = StepRecord::new(step_number)
            .with_thought(self.model_output())
            .with_code(self.code.clone())
            .with_images(self.images.clone());
        if let Some(observations) = &self.observations {
            record = record.with_observations(observations.clone());
        }
        if let Some(error) = &self.error {
            record = record.with_error(error.clone());
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    FinalAnswer { content: String, is_image: bool },
    Error(String),
}

/// Complete scripted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScript {
    pub steps: Vec<ScriptedStep>,
    pub outcome: ScriptOutcome,
}

impl RunScript {
    #[must_use]
    pub fn answering(steps: Vec<ScriptedStep>, answer: impl Into<String>) -> Self {
        Self {
            steps,
            outcome: ScriptOutcome::FinalAnswer {
                content: answer.into(),
                is_image: false,
            },
        }
    }

    #[must_use]
    pub fn failing(steps: Vec<ScriptedStep>, message: impl Into<String>) -> Self {
        Self {
            steps,
            outcome: ScriptOutcome::Error(message.into()),
        }
    }

    /// Default two-step script that echoes the submitted message.
    #[must_use]
    pub fn echo(message: &str) -> Self {
        let quoted = format!("{message:?}");
        Self::answering(
            vec![
                ScriptedStep::new(
                    "I will look at the request first.",
                    format!("request = {quoted}\nprint(len(request))"),
                )
                .calling("python_interpreter")
                .observing(message.chars().count().to_string()),
                ScriptedStep::new(
                    "I can answer directly now.",
                    format!("final_answer({quoted})"),
                )
                .calling("final_answer")
                .observing(message.to_string()),
            ],
            format!("You asked: {message}"),
        )
    }
}

/// Result of streaming a script's steps: the finalized records, the last
/// marked as the final-answer step when the run succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedRun {
    pub records: Vec<StepRecord>,
    pub succeeded: bool,
}

/// Emits every step of a script, numbering from `first_step`.
///
/// Each step streams its model output in small deltas, announces its tool,
/// then finalizes. The run's outcome is left to [`finish_run`] so a server can
/// persist the records before the client learns the run is over.
pub fn stream_steps(
    script: &RunScript,
    first_step: u32,
    token_delay: Duration,
    emit: &mut dyn FnMut(AgentEvent),
) -> StreamedRun {
    let mut records = Vec::with_capacity(script.steps.len());

    for (offset, step) in script.steps.iter().enumerate() {
        let step_number = first_step.saturating_add(offset as u32);
        let output: Vec<char> = step.model_output().chars().collect();
        for chunk in output.chunks(DELTA_CHUNK_CHARS) {
            emit(AgentEvent::text_delta(chunk.iter().collect::<String>()));
            if !token_delay.is_zero() {
                thread::sleep(token_delay);
            }
        }

        if let Some(tool) = &step.tool {
            emit(AgentEvent::tool_start(tool.clone()));
        }

        let record = step.record(step_number);
        emit(AgentEvent::StepFinalized(record.clone()));
        records.push(record);
    }

    let succeeded = match &script.outcome {
        ScriptOutcome::FinalAnswer { content, is_image } => {
            if let Some(last) = records.last_mut() {
                *last = last.clone().with_final_answer(content.clone(), *is_image);
            }
            true
        }
        ScriptOutcome::Error(_) => false,
    };

    StreamedRun { records, succeeded }
}

/// Emits the script's outcome followed by `run_complete`.
pub fn finish_run(script: &RunScript, emit: &mut dyn FnMut(AgentEvent)) {
    match &script.outcome {
        ScriptOutcome::FinalAnswer { content, is_image } => {
            emit(AgentEvent::final_answer(content.clone(), *is_image));
        }
        ScriptOutcome::Error(message) => emit(AgentEvent::run_error(message.clone())),
    }
    emit(AgentEvent::RunComplete);
}

/// Streams the steps and the outcome of a script in one go.
pub fn stream_script(
    script: &RunScript,
    first_step: u32,
    token_delay: Duration,
    emit: &mut dyn FnMut(AgentEvent),
) -> StreamedRun {
    let streamed = stream_steps(script, first_step, token_delay, emit);
    finish_run(script, emit);
    streamed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agent_protocol::AgentEvent;

    use super::{stream_script, RunScript, ScriptedStep};

    fn collect(script: &RunScript, first_step: u32) -> (Vec<AgentEvent>, super::StreamedRun) {
        let mut events = Vec::new();
        let streamed = stream_script(script, first_step, Duration::ZERO, &mut |event| {
            events.push(event)
        });
        (events, streamed)
    }

    #[test]
    fn deltas_reassemble_model_output_before_step_finalizes() {
        let step = ScriptedStep::new("Plan", "print(1)").calling("python_interpreter");
        let (events, _) = collect(&RunScript::answering(vec![step.clone()], "1"), 1);

        let streamed: String = events
            .iter()
            .take_while(|event| matches!(event, AgentEvent::TextDelta { .. }))
            .map(|event| match event {
                AgentEvent::TextDelta { content } => content.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(streamed, step.model_output());

        let tail: Vec<_> = events
            .iter()
            .skip_while(|event| matches!(event, AgentEvent::TextDelta { .. }))
            .collect();
        assert!(matches!(tail[0], AgentEvent::ToolStart { tool_name, .. } if tool_name == "python_interpreter"));
        assert!(matches!(tail[1], AgentEvent::StepFinalized(record) if record.step_number == 1));
        assert_eq!(tail[2], &AgentEvent::final_answer("1", false));
        assert_eq!(tail[3], &AgentEvent::RunComplete);
    }

    #[test]
    fn steps_number_from_offset_and_last_carries_final_answer() {
        let (_, streamed) = collect(&RunScript::echo("hi"), 5);
        let numbers: Vec<_> = streamed.records.iter().map(|r| r.step_number).collect();
        assert_eq!(numbers, vec![5, 6]);
        assert!(streamed.succeeded);

        let last = streamed.records.last().expect("records");
        assert!(last.is_final_answer);
        assert_eq!(last.action_output.as_deref(), Some("You asked: hi"));
        assert!(!streamed.records[0].is_final_answer);
    }

    #[test]
    fn failing_script_ends_with_error_then_complete() {
        let script = RunScript::failing(
            vec![ScriptedStep::new("Try", "1/0").failing("ZeroDivisionError")],
            "Agent stopped",
        );
        let (events, streamed) = collect(&script, 1);

        assert!(!streamed.succeeded);
        assert!(streamed.records[0].failed);
        let n = events.len();
        assert_eq!(events[n - 2], AgentEvent::run_error("Agent stopped"));
        assert_eq!(events[n - 1], AgentEvent::RunComplete);
    }
}
