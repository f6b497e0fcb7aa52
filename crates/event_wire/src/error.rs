use thiserror::Error;

/// Failure to decode or encode one wire frame.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame is not valid UTF-8")]
    Utf8(#[source] std::str::Utf8Error),

    #[error("frame is not valid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("frame has no string 'type' field")]
    MissingType,

    #[error("unknown frame type '{0}'")]
    UnknownType(String),

    #[error("frame '{frame_type}' is missing field '{field}'")]
    MissingField {
        frame_type: String,
        field: &'static str,
    },

    #[error("frame '{frame_type}' has invalid field '{field}': {reason}")]
    InvalidField {
        frame_type: String,
        field: &'static str,
        reason: String,
    },
}

impl WireError {
    pub(crate) fn json(source: serde_json::Error) -> Self {
        Self::Json { source }
    }

    pub(crate) fn missing(frame_type: &str, field: &'static str) -> Self {
        Self::MissingField {
            frame_type: frame_type.to_string(),
            field,
        }
    }

    pub(crate) fn invalid(frame_type: &str, field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidField {
            frame_type: frame_type.to_string(),
            field,
            reason: reason.to_string(),
        }
    }
}
