//! Field extraction shared by the live and snapshot paths.

use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;

const DEFAULT_IMAGE_MIME: &str = "image/png";

fn code_markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<code>.*?</code>").expect("static regex is valid"))
}

/// Strips embedded `<code>…</code>` blocks from model output and trims the rest.
///
/// Returns `None` when nothing but whitespace remains, so callers never emit
/// an empty thought block.
#[must_use]
pub fn extract_thought(model_output: Option<&str>) -> Option<String> {
    let raw = model_output?;
    let stripped = code_markup_pattern().replace_all(raw, "");
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Drops absent and whitespace-only optional text fields.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(ToString::to_string)
}

/// Renderable image source normalized from either an inline or external form.
///
/// Inline payloads always become a `data:` URI; bare base64 gets a MIME type
/// sniffed from its magic bytes. External `http(s)` references pass through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(String);

impl ImageRef {
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("data:")
            || trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
        {
            return Self(trimmed.to_string());
        }

        let mime = sniff_mime(trimmed).unwrap_or(DEFAULT_IMAGE_MIME);
        Self(format!("data:{mime};base64,{trimmed}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sniff_mime(base64_payload: &str) -> Option<&'static str> {
    // 16 base64 chars decode to 12 bytes, enough for every signature below.
    let prefix: String = base64_payload.chars().take(16).collect();
    let bytes = STANDARD.decode(prefix.as_bytes()).ok()?;

    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
