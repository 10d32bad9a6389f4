//! Endpoint handlers as plain functions from `(content type, body, key)` to an
//! [`ApiResponse`], so any HTTP layer can mount them.

use std::fmt;
use std::str::FromStr;

use kotoba_contracts::api::{
    ApiResponse, ChatRequest, KanjiImageRequest, Language, LookupRequest, RecognizeRequest,
    TranslateRequest, VocabularyRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::cascade::{attempts_json, AttemptRecord};
use crate::config::ApiKey;
use crate::error::PipelineError;
use crate::tasks::{KotobaEngine, TaskFailure, TaskOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Translate,
    Recognize,
    Lookup,
    Vocabulary,
    KanjiImage,
}

impl Endpoint {
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Chat,
        Endpoint::Translate,
        Endpoint::Recognize,
        Endpoint::Lookup,
        Endpoint::Vocabulary,
        Endpoint::KanjiImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chat",
            Endpoint::Translate => "translate",
            Endpoint::Recognize => "recognize",
            Endpoint::Lookup => "lookup",
            Endpoint::Vocabulary => "vocabulary",
            Endpoint::KanjiImage => "kanji-image",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = String;

    /// Accepts bare names as well as `/api/<name>` paths.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim().trim_matches('/');
        let name = name.strip_prefix("api/").unwrap_or(name);
        let name = name.replace('_', "-").to_ascii_lowercase();
        Endpoint::ALL
            .into_iter()
            .find(|endpoint| endpoint.as_str() == name)
            .ok_or_else(|| {
                format!(
                    "unknown endpoint '{}'; expected one of: {}",
                    raw.trim(),
                    Endpoint::ALL.map(|endpoint| endpoint.as_str()).join(", ")
                )
            })
    }
}

pub fn handle(
    engine: &KotobaEngine,
    endpoint: Endpoint,
    content_type: &str,
    body: &[u8],
    api_key_override: Option<&str>,
) -> ApiResponse {
    if !is_json_content_type(content_type) {
        return error_response(
            &PipelineError::UnsupportedMedia(format!(
                "expected application/json, got '{}'",
                content_type.trim()
            )),
            Language::default(),
            &[],
        );
    }
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            return error_response(
                &PipelineError::Validation(format!("request body is not valid JSON: {err}")),
                Language::default(),
                &[],
            )
        }
    };
    let language = payload
        .get("language")
        .cloned()
        .and_then(|value| serde_json::from_value::<Language>(value).ok())
        .unwrap_or_default();
    let api_key = api_key_override.and_then(ApiKey::new);
    let key = api_key.as_ref();

    match endpoint {
        Endpoint::Chat => respond(
            parse::<ChatRequest>(payload).and_then(|request| engine.chat(&request, key)),
            language,
        ),
        Endpoint::Translate => respond(
            parse::<TranslateRequest>(payload).and_then(|request| engine.translate(&request, key)),
            language,
        ),
        Endpoint::Recognize => respond(
            parse::<RecognizeRequest>(payload).and_then(|request| engine.recognize(&request, key)),
            language,
        ),
        Endpoint::Lookup => respond(
            parse::<LookupRequest>(payload).and_then(|request| engine.lookup(&request, key)),
            language,
        ),
        Endpoint::Vocabulary => respond(
            parse::<VocabularyRequest>(payload)
                .and_then(|request| engine.vocabulary(&request, key)),
            language,
        ),
        Endpoint::KanjiImage => {
            let result = parse::<KanjiImageRequest>(payload)
                .and_then(|request| engine.kanji_image_or_placeholder(&request, key));
            match result {
                Ok((image, None)) => ApiResponse::ok(json!(image)),
                Ok((image, Some(failure))) => {
                    let mut data = json!(image);
                    data["fallbackReason"] = json!(failure.error.to_string());
                    ApiResponse::ok(data)
                }
                Err(failure) => error_response(&failure.error, language, &failure.attempts),
            }
        }
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, TaskFailure> {
    serde_json::from_value(payload).map_err(|err| {
        TaskFailure::from(PipelineError::Validation(format!(
            "request body does not match the endpoint schema: {err}"
        )))
    })
}

fn respond<T: Serialize>(result: Result<TaskOutput<T>, TaskFailure>, language: Language) -> ApiResponse {
    match result {
        Ok(output) => {
            let mut data = json!(output.value);
            if let Some(reason) = &output.fallback_reason {
                data["modelFallbackReason"] = json!(reason);
            }
            ApiResponse::ok(data)
        }
        Err(failure) => error_response(&failure.error, language, &failure.attempts),
    }
}

fn error_response(error: &PipelineError, language: Language, attempts: &[AttemptRecord]) -> ApiResponse {
    warn!(
        kind = error.kind(),
        status = error.http_status(),
        attempts = attempts.len(),
        "request failed"
    );
    let mut details = json!({ "kind": error.kind() });
    if !attempts.is_empty() {
        details["attempts"] = attempts_json(attempts);
    }
    ApiResponse::error(error.http_status(), error.to_string())
        .with_fallback(error.fallback_message(language))
        .with_details(details)
}
