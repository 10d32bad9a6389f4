//! Recovers a JSON object (or array) from a model's free-text reply.
//!
//! Models are told to answer with JSON only, but in practice wrap it in
//! commentary or markdown fences, or emit near-miss JSON. [`extract`] tries,
//! in order and stopping at the first success:
//!
//! 1. the whole text as JSON;
//! 2. each fenced block and balanced bracket span;
//! 3. the [`REPAIRS`] applied cumulatively to the best span, re-parsing after each.
//!
//! When everything fails the last parse error is returned together with a
//! bounded excerpt of the raw text.

mod repairs;
mod span;

use serde_json::Value;
use thiserror::Error;

pub use repairs::{quote_bare_keys, quote_bare_values, strip_trailing_commas, Repair, REPAIRS};

pub const EXCERPT_MAX_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Direct,
    Span,
    Repair(&'static str),
}

/// One parse attempt; kept only for diagnostics of a single extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionAttempt {
    pub stage: ExtractionStage,
    pub raw_text: String,
    pub parsed_candidate: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub stage: ExtractionStage,
    pub attempts: Vec<ExtractionAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no JSON could be recovered: {message} (raw: {excerpt})")]
pub struct ExtractionError {
    pub message: String,
    pub excerpt: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>, raw: &str) -> Self {
        Self {
            message: message.into(),
            excerpt: excerpt(raw, EXCERPT_MAX_CHARS),
        }
    }
}

pub fn extract(raw: &str) -> Result<Value, ExtractionError> {
    extract_detailed(raw).map(|extracted| extracted.value)
}

pub fn extract_detailed(raw: &str) -> Result<Extracted, ExtractionError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ExtractionError::new("model returned empty text", raw));
    }
    let mut attempts: Vec<ExtractionAttempt> = Vec::new();

    if let Some(value) = try_parse(ExtractionStage::Direct, text, &mut attempts) {
        return Ok(finish(value, ExtractionStage::Direct, attempts));
    }

    let mut scalar_array: Option<Value> = None;
    for span in span::candidate_spans(text) {
        if span == text {
            continue;
        }
        let Some(value) = try_parse(ExtractionStage::Span, span, &mut attempts) else {
            continue;
        };
        // `[1]` in commentary parses too; a later object span beats it.
        if is_scalar_array(&value) {
            scalar_array.get_or_insert(value);
            continue;
        }
        return Ok(finish(value, ExtractionStage::Span, attempts));
    }
    if let Some(value) = scalar_array {
        return Ok(finish(value, ExtractionStage::Span, attempts));
    }

    let mut repaired = span::repair_base(text).to_string();
    for repair in REPAIRS {
        let next = (repair.apply)(&repaired);
        if next == repaired {
            continue;
        }
        repaired = next;
        let stage = ExtractionStage::Repair(repair.name);
        if let Some(value) = try_parse(stage, &repaired, &mut attempts) {
            return Ok(finish(value, stage, attempts));
        }
    }

    let message = attempts
        .iter()
        .rev()
        .find_map(|attempt| attempt.error.clone())
        .unwrap_or_else(|| "no JSON object or array found".to_string());
    Err(ExtractionError::new(message, raw))
}

/// Bounded, single-line excerpt of `raw` for logs and error payloads.
pub fn excerpt(raw: &str, max_chars: usize) -> String {
    let flattened = raw.split_whitespace().collect::<Vec<&str>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    flattened.chars().take(max_chars).collect::<String>() + "…"
}

fn try_parse(
    stage: ExtractionStage,
    candidate: &str,
    attempts: &mut Vec<ExtractionAttempt>,
) -> Option<Value> {
    let (parsed, error) = match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() || value.is_array() => (Some(value), None),
        Ok(_) => (None, Some("expected a JSON object or array".to_string())),
        Err(err) => (None, Some(err.to_string())),
    };
    attempts.push(ExtractionAttempt {
        stage,
        raw_text: candidate.to_string(),
        parsed_candidate: parsed.clone(),
        error,
    });
    parsed
}

fn is_scalar_array(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|rows| rows.iter().all(|row| !row.is_object() && !row.is_array()))
}

fn finish(value: Value, stage: ExtractionStage, attempts: Vec<ExtractionAttempt>) -> Extracted {
    Extracted {
        value,
        stage,
        attempts,
    }
}
