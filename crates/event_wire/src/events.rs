use agent_protocol::{AgentEvent, SessionSummary, SnapshotRecord, StepRecord};
use serde_json::Value;

use crate::error::WireError;

const UNKNOWN_ERROR_MESSAGE: &str = "Unknown server error";

/// Server message after alias normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Event for the current run.
    Run(AgentEvent),
    /// Full session list, newest first.
    SessionList(Vec<SessionSummary>),
    /// Ordered snapshot of a loaded session.
    SessionLoaded(Vec<SnapshotRecord>),
}

/// Encodes an event as one canonical NDJSON line, newline included.
pub fn encode_event(event: &AgentEvent) -> Result<String, WireError> {
    let mut line = serde_json::to_string(event).map_err(WireError::json)?;
    line.push('\n');
    Ok(line)
}

/// Maps a decoded JSON frame onto a [`WireMessage`].
pub fn decode_value(value: &Value) -> Result<WireMessage, WireError> {
    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(WireError::MissingType)?;

    let message = match frame_type {
        "text_delta" | "stream_delta" => WireMessage::Run(AgentEvent::TextDelta {
            content: string_field(value, "content").unwrap_or_default(),
        }),
        "tool_start" => {
            let tool_name = string_field(value, "tool_name")
                .ok_or_else(|| WireError::missing(frame_type, "tool_name"))?;
            WireMessage::Run(AgentEvent::ToolStart {
                tool_name,
                arguments: value.get("arguments").filter(|v| !v.is_null()).cloned(),
            })
        }
        "step_finalized" | "action_step" => {
            WireMessage::Run(AgentEvent::StepFinalized(step_record_from_value(value)?))
        }
        "final_answer" => WireMessage::Run(AgentEvent::FinalAnswer {
            content: text_field(value, "content").unwrap_or_default(),
            is_image: bool_field(value, "is_image"),
        }),
        "run_error" | "error" => WireMessage::Run(AgentEvent::RunError {
            message: string_field(value, "message")
                .or_else(|| string_field(value, "content"))
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
        }),
        "run_complete" => WireMessage::Run(AgentEvent::RunComplete),
        "history_list" | "session_list" => {
            let sessions = value
                .get("sessions")
                .or_else(|| value.get("history"))
                .cloned()
                .unwrap_or(Value::Array(Vec::new()));
            let sessions: Vec<SessionSummary> = serde_json::from_value(sessions)
                .map_err(|error| WireError::invalid(frame_type, "sessions", error))?;
            WireMessage::SessionList(sessions)
        }
        "reload_chat" | "session_loaded" => {
            let records = value
                .get("records")
                .or_else(|| value.get("history"))
                .and_then(Value::as_array)
                .ok_or_else(|| WireError::missing(frame_type, "records"))?;
            let records = records
                .iter()
                .map(snapshot_record_from_value)
                .collect::<Result<Vec<_>, _>>()?;
            WireMessage::SessionLoaded(records)
        }
        other => return Err(WireError::UnknownType(other.to_string())),
    };

    Ok(message)
}

/// Builds a step record from either the canonical or the legacy field names.
///
/// Legacy frames carry `code` for the code action and `content` for the
/// action output; a non-empty `error` implies a failed step.
pub fn step_record_from_value(value: &Value) -> Result<StepRecord, WireError> {
    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("step");

    let step_number = value
        .get("step_number")
        .ok_or_else(|| WireError::missing(frame_type, "step_number"))?
        .as_u64()
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| WireError::invalid(frame_type, "step_number", "expected u32"))?;

    let images = match value.get("images") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        Some(_) => return Err(WireError::invalid(frame_type, "images", "expected array")),
    };

    let error = text_field(value, "error");
    let failed = bool_field(value, "failed")
        || error.as_deref().is_some_and(|error| !error.trim().is_empty());

    Ok(StepRecord {
        step_number,
        model_output: string_field(value, "model_output"),
        code_action: string_field(value, "code_action").or_else(|| string_field(value, "code")),
        observations: text_field(value, "observations"),
        images,
        error,
        failed,
        is_final_answer: bool_field(value, "is_final_answer"),
        action_output: text_field(value, "action_output").or_else(|| text_field(value, "content")),
        is_image: bool_field(value, "is_image"),
    })
}

fn snapshot_record_from_value(value: &Value) -> Result<SnapshotRecord, WireError> {
    if value.get("kind").is_some() {
        return serde_json::from_value(value.clone()).map_err(WireError::json);
    }

    if value.get("step_number").is_some() {
        return step_record_from_value(value).map(SnapshotRecord::Step);
    }

    string_field(value, "task")
        .map(|task| SnapshotRecord::Task { task })
        .ok_or_else(|| WireError::missing("snapshot", "step_number"))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

/// String fields that servers sometimes send as structured values.
fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}
