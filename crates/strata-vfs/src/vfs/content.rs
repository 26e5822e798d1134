//! Decoded resource content and content-type detection.
//!
//! Magic-byte sniffing cannot tell text serialization formats apart, so a
//! generic `text/plain` result is refined by file extension. `.conf` files
//! are ambiguous even then: a leading `{` means JSON, anything else YAML.

use std::path::Path;

use serde_json::Value;

use super::error::VfsResult;

pub const MIME_JSON: &str = "application/json";
pub const MIME_YAML: &str = "application/x-yaml";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_BINARY: &str = "application/octet-stream";
pub const MIME_TAR: &str = "application/x-tar";

/// In-memory content of one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Parsed JSON or YAML document.
    Structured(Value),
    /// Plain text.
    Text(String),
    /// Anything else, unparsed.
    Binary(Vec<u8>),
}

impl Content {
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Short label used in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

/// Guess the content type of `bytes`, named `name` at its source.
pub fn sniff_content_type(bytes: &[u8], name: &Path) -> String {
    let detected = match infer::get(bytes) {
        Some(kind) => kind.mime_type(),
        None if std::str::from_utf8(bytes).is_ok() => MIME_TEXT,
        None => MIME_BINARY,
    };

    if detected != MIME_TEXT {
        return detected.to_string();
    }

    let extension = name
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let refined = match extension.as_deref() {
        Some("json") => MIME_JSON,
        Some("yaml") | Some("yml") => MIME_YAML,
        Some("conf") => match bytes.first() {
            Some(b'{') => MIME_JSON,
            _ => MIME_YAML,
        },
        _ => MIME_TEXT,
    };
    refined.to_string()
}

fn is_json(content_type: &str) -> bool {
    content_type == MIME_JSON || content_type.ends_with("+json")
}

fn is_yaml(content_type: &str) -> bool {
    matches!(
        content_type,
        MIME_YAML | "application/yaml" | "text/yaml" | "text/x-yaml"
    )
}

/// Decode raw bytes according to their content type.
///
/// JSON and YAML become [`Content::Structured`], `text/plain` becomes
/// [`Content::Text`], everything else stays [`Content::Binary`].
pub fn decode(bytes: Vec<u8>, content_type: &str) -> VfsResult<Content> {
    if is_json(content_type) {
        return Ok(Content::Structured(serde_json::from_slice(&bytes)?));
    }
    if is_yaml(content_type) {
        return Ok(Content::Structured(serde_yaml::from_slice(&bytes)?));
    }
    if content_type == MIME_TEXT {
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        return Ok(Content::Text(text));
    }
    Ok(Content::Binary(bytes))
}
