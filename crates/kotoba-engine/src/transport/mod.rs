//! Outbound `generateContent` calls: request/response shapes shared by every
//! transport, plus the Gemini HTTP, offline dryrun and scripted transports.

mod dryrun;
mod gemini;
mod scripted;

use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::config::ApiKey;
use crate::error::PipelineError;

pub(crate) use dryrun::color_from_prompt;
pub use dryrun::DryrunTransport;
pub use gemini::GeminiTransport;
pub use scripted::{RecordedCall, ScriptedReply, ScriptedTransport};

/// Finish reasons that mean the model's content filter refused the request.
pub const SAFETY_FINISH_REASONS: [&str; 5] =
    ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "IMAGE_SAFETY"];

pub trait GenerativeTransport: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineData { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
        }
    }

    /// Accepts both the camelCase and snake_case spellings the API emits.
    fn from_json(value: &Value) -> Option<Self> {
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return Some(Part::Text(text.to_string()));
        }
        let inline = value
            .get("inlineData")
            .or_else(|| value.get("inline_data"))
            .and_then(Value::as_object)?;
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            return None;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        Some(Part::inline(mime_type, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    pub const fn new(temperature: f32, top_p: f32, top_k: u32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            top_p,
            top_k,
            max_output_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Text,
    Image,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<Part>,
    pub params: GenerationParams,
    pub modality: ResponseModality,
    pub timeout: Duration,
    pub api_key: Option<ApiKey>,
    /// Task context for logs and offline transports; never sent upstream.
    pub metadata: Map<String, Value>,
}

impl GenerateRequest {
    pub fn to_payload(&self) -> Value {
        let mut generation_config = Map::new();
        generation_config.insert("temperature".to_string(), json!(self.params.temperature));
        generation_config.insert("topP".to_string(), json!(self.params.top_p));
        generation_config.insert("topK".to_string(), json!(self.params.top_k));
        generation_config.insert(
            "maxOutputTokens".to_string(),
            json!(self.params.max_output_tokens),
        );
        if self.modality == ResponseModality::Image {
            generation_config.insert(
                "responseModalities".to_string(),
                json!(["TEXT", "IMAGE"]),
            );
        }
        json!({
            "contents": [{
                "role": "user",
                "parts": self.parts.iter().map(Part::to_json).collect::<Vec<_>>(),
            }],
            "generationConfig": generation_config,
            "safetySettings": default_safety_settings(),
        })
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub parts: Vec<Part>,
    pub finish_reason: Option<String>,
    pub block_reason: Option<String>,
    pub model_version: Option<String>,
    pub warnings: Vec<String>,
}

impl GenerateResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            finish_reason: Some("STOP".to_string()),
            ..Self::default()
        }
    }

    pub fn from_image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::inline(mime_type, data)],
            finish_reason: Some("STOP".to_string()),
            ..Self::default()
        }
    }

    pub fn blocked(finish_reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(finish_reason.into()),
            ..Self::default()
        }
    }

    /// Reads `candidates[0]` and `promptFeedback` from a `generateContent` reply.
    pub fn from_payload(payload: &Value) -> Self {
        let candidate = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());
        let parts = candidate
            .and_then(|row| row.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(Part::from_json).collect())
            .unwrap_or_default();
        let finish_reason = candidate
            .and_then(|row| row.get("finishReason").or_else(|| row.get("finish_reason")))
            .and_then(Value::as_str)
            .map(str::to_string);
        let block_reason = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let model_version = payload
            .get("modelVersion")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            parts,
            finish_reason,
            block_reason,
            model_version,
            warnings: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// First inline image as `(mime_type, base64)`.
    pub fn first_image(&self) -> Option<(&str, &str)> {
        self.parts.iter().find_map(|part| match part {
            Part::InlineData { mime_type, data } if mime_type.starts_with("image/") => {
                Some((mime_type.as_str(), data.as_str()))
            }
            _ => None,
        })
    }

    pub fn safety_block(&self) -> Option<String> {
        if let Some(reason) = self.block_reason.as_deref() {
            return Some(reason.to_string());
        }
        self.finish_reason
            .as_deref()
            .filter(|reason| SAFETY_FINISH_REASONS.contains(reason))
            .map(str::to_string)
    }
}

pub fn default_safety_settings() -> Vec<Value> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| {
        json!({
            "category": category,
            "threshold": "BLOCK_ONLY_HIGH",
        })
    })
    .collect()
}

/// Maps a non-2xx `generateContent` reply onto the pipeline taxonomy.
pub fn classify_status(status: u16, body: &str) -> PipelineError {
    let message = upstream_message(body);
    let lowered = message.to_ascii_lowercase();
    match status {
        400 if lowered.contains("api key") => PipelineError::Unauthorized(message),
        401 | 403 => PipelineError::Unauthorized(message),
        404 => PipelineError::UpstreamUnavailable(message),
        429 => PipelineError::RateLimited(message),
        _ if lowered.contains("not found") || lowered.contains("deprecated") => {
            PipelineError::UpstreamUnavailable(message)
        }
        _ => PipelineError::Upstream { status, message },
    }
}

/// `error.message` from a Google error body, else the truncated raw body.
fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(body);
    truncate_text(message.trim(), 512)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
