//! Task entry points: each one validates its typed request, builds the plan,
//! and walks it with prompt building, timed dispatch, extraction and
//! validation as the per-step attempt.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use kotoba_contracts::api::{
    encode_data_url, ChatReply, ChatRequest, KanjiImage, KanjiImageRequest, LookupRequest,
    RecognizeRequest, RequestError, TranslateRequest, TranslationResult, VocabularyList,
    VocabularyRequest,
};
use kotoba_contracts::events::{redact_payload, EventPayload, EventWriter};
use kotoba_contracts::extract::{extract, ExtractionError};
use kotoba_contracts::kanji::{validate, validate_expecting, KanjiRecord};
use kotoba_contracts::models::{
    ModelSelector, CAPABILITY_IMAGE, CAPABILITY_TEXT, CAPABILITY_VISION,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cascade::{
    self, build_plan, plan_with_preferred_model, run_cascade, AttemptRecord, PlanStep,
};
use crate::config::{ApiKey, EngineConfig};
use crate::dispatch::dispatch_generate;
use crate::error::PipelineError;
use crate::placeholder::placeholder_image;
use crate::prompts::{build_prompt, PromptVariant, TaskInput, TaskKind};
use crate::transport::{
    truncate_text, DryrunTransport, GeminiTransport, GenerateRequest, GenerateResponse,
    GenerativeTransport,
};

const FINGERPRINT_HEX_CHARS: usize = 16;
const DEBUG_PAYLOAD_CHARS: usize = 600;

/// An accepted result plus the provenance of the step that produced it.
#[derive(Debug, Clone)]
pub struct TaskOutput<T> {
    pub value: T,
    pub model: String,
    pub step: usize,
    pub variant: PromptVariant,
    pub attempts: Vec<AttemptRecord>,
    pub warnings: Vec<String>,
    /// Why the caller's model hint was not used as given.
    pub fallback_reason: Option<String>,
}

/// A task that produced no accepted result, with every attempt it made.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TaskFailure {
    pub error: PipelineError,
    pub attempts: Vec<AttemptRecord>,
}

impl From<PipelineError> for TaskFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            attempts: Vec::new(),
        }
    }
}

impl From<RequestError> for TaskFailure {
    fn from(error: RequestError) -> Self {
        PipelineError::from(error).into()
    }
}

impl From<RequestError> for PipelineError {
    fn from(error: RequestError) -> Self {
        if error.is_unsupported_media() {
            PipelineError::UnsupportedMedia(error.to_string())
        } else {
            PipelineError::Validation(error.to_string())
        }
    }
}

pub type TaskResult<T> = Result<TaskOutput<T>, TaskFailure>;

/// Holds no per-request state; one engine serves any number of independent
/// requests.
pub struct KotobaEngine {
    config: EngineConfig,
    transport: Arc<dyn GenerativeTransport>,
    selector: ModelSelector,
    events: Option<EventWriter>,
}

impl KotobaEngine {
    /// Gemini over HTTP, or the offline transport when `config.dryrun` is set.
    pub fn new(config: EngineConfig) -> Self {
        let transport: Arc<dyn GenerativeTransport> = if config.dryrun {
            Arc::new(DryrunTransport::new())
        } else {
            Arc::new(GeminiTransport::new(&config))
        };
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: EngineConfig, transport: Arc<dyn GenerativeTransport>) -> Self {
        let events = config
            .events_path
            .clone()
            .map(|path| EventWriter::new(path, "engine"));
        Self {
            config,
            transport,
            selector: ModelSelector::default(),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn recognize(
        &self,
        request: &RecognizeRequest,
        api_key_override: Option<&ApiKey>,
    ) -> TaskResult<KanjiRecord> {
        let image = request.decode_image()?;
        let digest = hex::encode(Sha256::digest(&image.bytes));
        info!(
            fingerprint = &digest[..FINGERPRINT_HEX_CHARS],
            bytes = image.bytes.len(),
            mime_type = image.mime_type,
            "recognition bitmap received"
        );
        self.run(
            TaskInput::Recognize { image },
            request.model_hint.as_deref(),
            api_key_override,
            |response| Ok(validate(&extract(&response.text())?)?),
        )
    }

    pub fn lookup(
        &self,
        request: &LookupRequest,
        api_key_override: Option<&ApiKey>,
    ) -> TaskResult<KanjiRecord> {
        let character = request.ideograph()?;
        self.run(
            TaskInput::Lookup { character },
            None,
            api_key_override,
            |response| Ok(validate_expecting(&extract(&response.text())?, Some(character))?),
        )
    }

    pub fn chat(
        &self,
        request: &ChatRequest,
        api_key_override: Option<&ApiKey>,
    ) -> TaskResult<ChatReply> {
        request.validate()?;
        let input = TaskInput::Chat {
            message: request.message.trim().to_string(),
            context: request
                .context
                .as_deref()
                .map(str::trim)
                .filter(|context| !context.is_empty())
                .map(str::to_string),
            language: request.language.unwrap_or_default(),
        };
        self.run(input, None, api_key_override, |response| {
            let text = response.text();
            let reply = text.trim();
            if reply.is_empty() {
                return Err(ExtractionError::new("model returned empty text", &text).into());
            }
            Ok(ChatReply {
                reply: reply.to_string(),
            })
        })
    }

    pub fn translate(
        &self,
        request: &TranslateRequest,
        api_key_override: Option<&ApiKey>,
    ) -> TaskResult<TranslationResult> {
        request.validate()?;
        let input = TaskInput::Translate {
            text: request.text.trim().to_string(),
            target: request.target(),
        };
        self.run(input, None, api_key_override, |response| {
            Ok(TranslationResult::from_candidate(&extract(&response.text())?)?)
        })
    }

    pub fn vocabulary(
        &self,
        request: &VocabularyRequest,
        api_key_override: Option<&ApiKey>,
    ) -> TaskResult<VocabularyList> {
        request.validate()?;
        let count = request.count();
        let input = TaskInput::Vocabulary {
            topic: request.topic.trim().to_string(),
            level: request.level,
            count,
        };
        self.run(input, None, api_key_override, |response| {
            Ok(VocabularyList::from_candidate(
                &extract(&response.text())?,
                count as usize,
            )?)
        })
    }

    pub fn kanji_image(
        &self,
        request: &KanjiImageRequest,
        api_key_override: Option<&ApiKey>,
    ) -> TaskResult<KanjiImage> {
        let character = request.ideograph()?;
        let input = TaskInput::KanjiImage {
            character,
            style: request
                .style
                .as_deref()
                .map(str::trim)
                .filter(|style| !style.is_empty())
                .map(str::to_string),
        };
        let mut output = self.run(input, None, api_key_override, |response| {
            let (mime_type, data) = response.first_image().ok_or(PipelineError::NoImageData)?;
            let bytes = BASE64
                .decode(data.trim())
                .map_err(|_| PipelineError::NoImageData)?;
            if bytes.is_empty() {
                return Err(PipelineError::NoImageData);
            }
            Ok(KanjiImage {
                character: character.to_string(),
                data_url: encode_data_url(mime_type, &bytes),
                mime_type: mime_type.to_string(),
                model: None,
                placeholder: false,
            })
        })?;
        output.value.model = Some(output.model.clone());
        Ok(output)
    }

    /// Like [`Self::kanji_image`], but an exhausted plan yields a placeholder
    /// card instead of an error. Caller-input and credential errors still fail.
    pub fn kanji_image_or_placeholder(
        &self,
        request: &KanjiImageRequest,
        api_key_override: Option<&ApiKey>,
    ) -> Result<(KanjiImage, Option<TaskFailure>), TaskFailure> {
        match self.kanji_image(request, api_key_override) {
            Ok(output) => Ok((output.value, None)),
            Err(failure) if failure.error.advances_cascade() => {
                let character = request.ideograph()?;
                warn!(
                    character = %character,
                    error = %failure.error,
                    "image generation exhausted; serving placeholder"
                );
                Ok((placeholder_image(character)?, Some(failure)))
            }
            Err(failure) => Err(failure),
        }
    }

    fn run<T>(
        &self,
        input: TaskInput,
        model_hint: Option<&str>,
        api_key_override: Option<&ApiKey>,
        accept: impl Fn(&GenerateResponse) -> Result<T, PipelineError>,
    ) -> TaskResult<T> {
        let task = input.kind();
        let request_id = Uuid::new_v4().to_string();
        let events = self
            .events
            .as_ref()
            .map(|writer| writer.for_request(request_id.clone()));

        let (plan, fallback_reason) = self.plan(task, model_hint);
        let api_key = api_key_override
            .cloned()
            .or_else(|| self.config.api_key.clone());
        let timeout = plan.first().map(|step| step.timeout).unwrap_or_default();

        info!(
            task = %task,
            request_id = %request_id,
            transport = self.transport.name(),
            steps = plan.len(),
            timeout_ms = timeout.as_millis() as u64,
            "task started"
        );
        cascade::emit(events.as_ref(), "task_started", {
            let mut payload = EventPayload::new();
            payload.insert("task".to_string(), json!(task.as_str()));
            payload.insert("transport".to_string(), json!(self.transport.name()));
            payload.insert("steps".to_string(), json!(plan.len()));
            payload.insert("model_hint".to_string(), json!(model_hint));
            payload.insert("fallback_reason".to_string(), json!(fallback_reason));
            payload
        });

        let report = run_cascade(task, &plan, events.as_ref(), |idx, step| {
            let prompt = build_prompt(&input, step.variant);
            let request = GenerateRequest {
                model: step.model.clone(),
                parts: prompt.parts,
                params: step.params,
                modality: prompt.modality,
                timeout: step.timeout,
                api_key: api_key.clone(),
                metadata: prompt.metadata,
            };
            debug!(
                task = %task,
                step = idx,
                model = %step.model,
                payload = %truncate_text(
                    &redact_payload(&request.to_payload()).to_string(),
                    DEBUG_PAYLOAD_CHARS
                ),
                "dispatching attempt"
            );
            let response = dispatch_generate(Arc::clone(&self.transport), request)?;
            if let Some(reason) = response.safety_block() {
                return Err(PipelineError::SafetyBlock(reason));
            }
            let value = accept(&response)?;
            Ok((value, response.warnings))
        });

        let attempts = report.attempts;
        match (report.result, report.step) {
            (Ok((value, warnings)), Some(idx)) => {
                let step = &plan[idx];
                info!(
                    task = %task,
                    request_id = %request_id,
                    step = idx,
                    model = %step.model,
                    attempts = attempts.len(),
                    "task finished"
                );
                Ok(TaskOutput {
                    value,
                    model: step.model.clone(),
                    step: idx,
                    variant: step.variant,
                    attempts,
                    warnings,
                    fallback_reason,
                })
            }
            (Ok(_), None) => Err(TaskFailure {
                error: PipelineError::Transport("cascade succeeded without a step".to_string()),
                attempts,
            }),
            (Err(error), _) => Err(TaskFailure { error, attempts }),
        }
    }

    fn plan(&self, task: TaskKind, model_hint: Option<&str>) -> (Vec<PlanStep>, Option<String>) {
        let plan = build_plan(task, &self.config.timeouts);
        let Some(hint) = model_hint.map(str::trim).filter(|hint| !hint.is_empty()) else {
            return (plan, None);
        };
        let capability = match task {
            TaskKind::Recognize => CAPABILITY_VISION,
            TaskKind::KanjiImage => CAPABILITY_IMAGE,
            _ => CAPABILITY_TEXT,
        };
        match self.selector.select(Some(hint), capability) {
            Ok(selection) => {
                if let Some(reason) = &selection.fallback_reason {
                    warn!(task = %task, hint, reason = %reason, "model hint not used as given");
                }
                (
                    plan_with_preferred_model(
                        plan,
                        &selection.model.name,
                        self.config.timeouts.for_task(task),
                    ),
                    selection.fallback_reason,
                )
            }
            Err(reason) => {
                warn!(task = %task, hint, reason = %reason, "model hint ignored");
                (plan, Some(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    use kotoba_contracts::api::{
        ChatRequest, KanjiImageRequest, LookupRequest, RecognizeRequest, TranslateRequest,
    };
    use serde_json::{json, Value};

    use super::KotobaEngine;
    use crate::config::{ApiKey, EngineConfig};
    use crate::error::PipelineError;
    use crate::prompts::{PromptVariant, TaskKind};
    use crate::transport::{Part, ScriptedReply, ScriptedTransport};

    const TINY_PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn record_text(character: &str) -> String {
        json!({
            "character": character,
            "onReading": ["ニチ"],
            "kunReading": ["ひ"],
            "meaning": ["sun"],
            "strokeCount": 4,
            "jlptLevel": "N5",
            "examples": [{"word": "日本", "reading": "にほん", "meaning": "Japan"}]
        })
        .to_string()
    }

    fn engine(replies: Vec<ScriptedReply>) -> (KotobaEngine, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let engine = KotobaEngine::with_transport(EngineConfig::default(), transport.clone());
        (engine, transport)
    }

    #[test]
    fn recognize_falls_back_past_safety_block_and_garbage() -> anyhow::Result<()> {
        let (engine, transport) = engine(vec![
            ScriptedReply::safety_block("SAFETY"),
            ScriptedReply::text("I think it might be the sun?"),
            ScriptedReply::text(format!("```json\n{}\n```", record_text("日"))),
        ]);
        let request = RecognizeRequest {
            image: TINY_PNG.to_string(),
            model_hint: None,
        };
        let output = engine.recognize(&request, None)?;
        assert_eq!(output.value.character, "日");
        assert_eq!(output.attempts.len(), 3);

        let calls = transport.calls();
        // the safety block skips the second step on the same model
        assert_eq!(calls[0].model, "gemini-2.5-flash");
        assert_eq!(calls[1].model, "gemini-2.0-flash");
        assert_eq!(calls[1].variant.as_deref(), Some("sanitized"));
        assert_eq!(calls[2].model, "gemini-2.5-pro");
        assert_eq!(output.step, 3);
        assert_eq!(output.variant, PromptVariant::Minimal);
        assert!(calls[0]
            .parts
            .iter()
            .any(|part| matches!(part, Part::InlineData { mime_type, .. } if mime_type == "image/png")));
        Ok(())
    }

    #[test]
    fn unsupported_image_is_rejected_before_any_call() {
        let (engine, transport) = engine(vec![]);
        let request = RecognizeRequest {
            image: "data:image/gif;base64,R0lGOD".to_string(),
            model_hint: None,
        };
        let failure = engine.recognize(&request, None).unwrap_err();
        assert!(matches!(failure.error, PipelineError::UnsupportedMedia(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn lookup_rejects_a_different_character() {
        let (engine, _) = engine(vec![
            ScriptedReply::text(record_text("月")),
            ScriptedReply::text(record_text("月")),
            ScriptedReply::text(record_text("月")),
        ]);
        let request = LookupRequest {
            character: "日".to_string(),
        };
        let failure = engine.lookup(&request, None).unwrap_err();
        assert!(matches!(failure.error, PipelineError::SemanticValidation(_)));
        assert_eq!(failure.attempts.len(), 3);
    }

    #[test]
    fn timeout_on_every_step_surfaces_timeout() {
        let mut config = EngineConfig::default();
        config
            .timeouts
            .set(TaskKind::Chat, Duration::from_millis(30));
        let transport = Arc::new(ScriptedTransport::new(
            (0..3).map(|_| ScriptedReply::text("late").delayed(Duration::from_millis(200))),
        ));
        let engine = KotobaEngine::with_transport(config, transport.clone());
        let request = ChatRequest {
            message: "こんにちは".to_string(),
            context: None,
            language: None,
        };
        let failure = engine.chat(&request, None).unwrap_err();
        assert!(matches!(failure.error, PipelineError::Timeout(_)));
        assert_eq!(transport.calls().len(), 3);
        assert!(transport
            .calls()
            .iter()
            .all(|call| call.timeout == Duration::from_millis(30)));
    }

    #[test]
    fn api_key_override_is_passed_per_request() -> anyhow::Result<()> {
        let (engine, _) = engine(vec![ScriptedReply::text(
            json!({"translation": "hello"}).to_string(),
        )]);
        let key = ApiKey::new("override-key").ok_or_else(|| anyhow::anyhow!("key"))?;
        let request = TranslateRequest {
            text: "こんにちは".to_string(),
            target_language: None,
        };
        let output = engine.translate(&request, Some(&key))?;
        assert_eq!(output.value.translation, "hello");
        Ok(())
    }

    #[test]
    fn deprecated_hint_is_replaced_and_reported() -> anyhow::Result<()> {
        let (engine, transport) = engine(vec![ScriptedReply::text(record_text("日"))]);
        let request = RecognizeRequest {
            image: TINY_PNG.to_string(),
            model_hint: Some("gemini-pro-vision".to_string()),
        };
        let output = engine.recognize(&request, None)?;
        assert_eq!(transport.calls()[0].model, "gemini-2.5-flash");
        assert!(output
            .fallback_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("deprecated")));
        Ok(())
    }

    #[test]
    fn exhausted_image_generation_serves_placeholder() -> anyhow::Result<()> {
        let (engine, _) = engine(vec![
            ScriptedReply::text("no image, sorry"),
            ScriptedReply::safety_block("IMAGE_SAFETY"),
            ScriptedReply::text("still nothing"),
        ]);
        let request = KanjiImageRequest {
            character: "山".to_string(),
            style: None,
        };
        let (image, failure) = engine.kanji_image_or_placeholder(&request, None)?;
        assert!(image.placeholder);
        assert_eq!(image.character, "山");
        assert!(image.data_url.starts_with("data:image/png;base64,"));
        assert!(failure.is_some());
        Ok(())
    }

    #[test]
    fn unauthorized_image_generation_is_not_masked() {
        let (engine, _) = engine(vec![ScriptedReply::error(PipelineError::Unauthorized(
            "API key not valid".to_string(),
        ))]);
        let request = KanjiImageRequest {
            character: "山".to_string(),
            style: None,
        };
        let failure = engine
            .kanji_image_or_placeholder(&request, None)
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::Unauthorized(_)));
        assert_eq!(failure.attempts.len(), 1);
    }

    #[test]
    fn events_are_written_per_request() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let config = EngineConfig {
            events_path: Some(path.clone()),
            ..EngineConfig::default()
        };
        let transport = Arc::new(ScriptedTransport::new([ScriptedReply::text(
            record_text("日"),
        )]));
        let engine = KotobaEngine::with_transport(config, transport);
        engine.lookup(
            &LookupRequest {
                character: "日".to_string(),
            },
            None,
        )?;
        let events: Vec<Value> = fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(events[0]["type"], "task_started");
        assert_eq!(events[1]["type"], "attempt_succeeded");
        assert_eq!(events[0]["request_id"], events[1]["request_id"]);
        assert_ne!(events[0]["request_id"], "engine");
        Ok(())
    }
}
