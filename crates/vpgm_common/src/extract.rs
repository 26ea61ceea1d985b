//! Output extractor.
//!
//! Best-effort recovery of a JSON object from free model text. Models wrap
//! their JSON in prose or code fences often enough that a strict parse is
//! not enough, but this is a fallback parser, not a guarantee: the span
//! between the first `{` and the last `}` is taken as is, so stray braces in
//! surrounding prose will make the candidate unparseable.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No JSON object found in output.")]
    NoObject,

    #[error("Extracted text is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
}

/// Return the JSON text contained in `raw`.
///
/// The whole reply is returned unchanged when it already parses. Otherwise
/// the first-`{` to last-`}` span is tried.
pub fn extract_json(raw: &str) -> Result<&str, ExtractionError> {
    if serde_json::from_str::<Value>(raw).is_ok() {
        return Ok(raw);
    }

    let (start, end) = match (raw.find('{'), raw.rfind('}')) {
        (Some(s), Some(e)) if s <= e => (s, e),
        _ => return Err(ExtractionError::NoObject),
    };

    let candidate = &raw[start..=end];
    serde_json::from_str::<Value>(candidate).map_err(ExtractionError::InvalidJson)?;
    Ok(candidate)
}

/// Extract and parse in one step.
pub fn parse_reply(raw: &str) -> Result<Value, ExtractionError> {
    let text = extract_json(raw)?;
    serde_json::from_str(text).map_err(ExtractionError::InvalidJson)
}
