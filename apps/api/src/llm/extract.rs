//! Structured Extractor — recovers a JSON value from free-form model output.
//!
//! Strategies run in priority order:
//! 1. A fenced ```json block. A malformed block fails immediately — an
//!    explicit block is the model's intended answer, not a cue to keep
//!    searching.
//! 2. The whole text parsed as JSON.
//! 3. The first `{` to the last `}` span.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("found a JSON block but it was invalid JSON: {reason}")]
    InvalidJsonBlock { reason: String },

    #[error("no JSON object found in model output")]
    NoJsonFound,
}

impl ExtractionError {
    /// Which strategies ran before the extraction gave up. Attached to the
    /// error payload's `details` field.
    pub fn strategies_tried(&self) -> Vec<&'static str> {
        match self {
            ExtractionError::InvalidJsonBlock { .. } => vec!["fenced_block"],
            ExtractionError::NoJsonFound => vec!["fenced_block", "whole_text", "brace_scan"],
        }
    }
}

/// Extracts a JSON value from raw model output.
pub fn extract_json(raw: &str) -> Result<Value, ExtractionError> {
    // Strategy 1: fenced ```json block anywhere in the text.
    if let Some(interior) = find_json_fence(raw) {
        return serde_json::from_str(interior)
            .map_err(|e| ExtractionError::InvalidJsonBlock {
                reason: e.to_string(),
            });
    }

    // Strategy 2: the whole text is JSON.
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    // Strategy 3: greedy brace span, first `{` to last `}`.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ExtractionError::NoJsonFound)
}

/// Locates the interior of the first ```json fenced block, if any.
fn find_json_fence(raw: &str) -> Option<&str> {
    let start = raw.find("```json")?;
    let interior = &raw[start + "```json".len()..];
    let end = interior.find("```")?;
    Some(interior[..end].trim())
}
