//! Fallback cascade: an ordered plan of model/prompt configurations walked
//! sequentially until one attempt yields an accepted result.

use std::time::{Duration, Instant};

use kotoba_contracts::events::{EventPayload, EventWriter};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::TaskTimeouts;
use crate::error::PipelineError;
use crate::prompts::{PromptVariant, TaskKind};
use crate::transport::{truncate_text, GenerationParams};

const RAW_EXCERPT_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub model: String,
    pub variant: PromptVariant,
    pub params: GenerationParams,
    /// Deadline for one attempt at this step.
    pub timeout: Duration,
}

impl PlanStep {
    pub fn new(model: &str, variant: PromptVariant, timeout: Duration) -> Self {
        Self {
            model: model.to_string(),
            variant,
            params: variant.params(),
            timeout,
        }
    }
}

/// Compile-time plan for a task, richest and most expensive step first.
pub fn plan_for(task: TaskKind) -> &'static [(&'static str, PromptVariant)] {
    use PromptVariant::{Full, Minimal, Sanitized};
    match task {
        TaskKind::Recognize => &[
            ("gemini-2.5-flash", Full),
            ("gemini-2.5-flash", Minimal),
            ("gemini-2.0-flash", Sanitized),
            ("gemini-2.5-pro", Minimal),
        ],
        TaskKind::Lookup | TaskKind::Vocabulary => &[
            ("gemini-2.5-flash", Full),
            ("gemini-2.0-flash", Sanitized),
            ("gemini-2.0-flash-lite", Minimal),
        ],
        TaskKind::Chat | TaskKind::Translate => &[
            ("gemini-2.5-flash", Full),
            ("gemini-2.0-flash", Sanitized),
            ("gemini-2.0-flash-lite", Minimal),
        ],
        TaskKind::KanjiImage => &[
            ("gemini-2.5-flash-image", Full),
            ("gemini-2.0-flash-preview-image-generation", Sanitized),
            ("gemini-2.5-flash-image", Minimal),
        ],
    }
}

/// Materializes [`plan_for`], giving every step the task's configured deadline.
pub fn build_plan(task: TaskKind, timeouts: &TaskTimeouts) -> Vec<PlanStep> {
    let timeout = timeouts.for_task(task);
    plan_for(task)
        .iter()
        .map(|(model, variant)| PlanStep::new(model, *variant, timeout))
        .collect()
}

/// Puts a caller-preferred model in front of the plan with the richest prompt.
pub fn plan_with_preferred_model(
    mut plan: Vec<PlanStep>,
    model: &str,
    timeout: Duration,
) -> Vec<PlanStep> {
    let preferred = PlanStep::new(model, PromptVariant::Full, timeout);
    plan.retain(|step| step != &preferred);
    plan.insert(0, preferred);
    plan
}

#[derive(Debug)]
pub enum CascadeState<T> {
    Pending(usize),
    Succeeded(T),
    Exhausted(PipelineError),
}

/// Index of the step to run after `current` failed with `error`, or `None`
/// when the cascade is over.
///
/// A safety block skips every remaining step on the same model and jumps to
/// the next sanitized step on another model (else any step on another model).
/// An unavailable model is skipped the same way. Credential and caller-input
/// errors end the cascade.
pub fn next_step(plan: &[PlanStep], current: usize, error: &PipelineError) -> Option<usize> {
    if !error.advances_cascade() {
        return None;
    }
    let failed_model = plan.get(current)?.model.as_str();
    let later = || (current + 1..plan.len()).filter(|idx| plan[*idx].model != failed_model);
    match error {
        PipelineError::SafetyBlock(_) => later()
            .find(|idx| plan[*idx].variant == PromptVariant::Sanitized)
            .or_else(|| later().next()),
        PipelineError::UpstreamUnavailable(_) => later().next(),
        _ => (current + 1 < plan.len()).then_some(current + 1),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub step: usize,
    pub model: String,
    pub variant: PromptVariant,
    pub outcome: &'static str,
    pub latency: Duration,
    pub error: Option<String>,
}

impl AttemptRecord {
    fn to_payload(&self, task: TaskKind) -> EventPayload {
        let mut payload = EventPayload::new();
        payload.insert("task".to_string(), json!(task.as_str()));
        payload.insert("step".to_string(), json!(self.step));
        payload.insert("model".to_string(), json!(self.model));
        payload.insert("variant".to_string(), json!(self.variant.as_str()));
        payload.insert("outcome".to_string(), json!(self.outcome));
        payload.insert(
            "latency_ms".to_string(),
            json!(self.latency.as_millis() as u64),
        );
        if let Some(error) = &self.error {
            payload.insert("error".to_string(), json!(error));
        }
        payload
    }
}

#[derive(Debug)]
pub struct CascadeReport<T> {
    pub result: Result<T, PipelineError>,
    /// Index of the step that succeeded.
    pub step: Option<usize>,
    pub attempts: Vec<AttemptRecord>,
}

/// Walks `plan`, calling `attempt` for each step it visits. Never runs two
/// attempts at once and never revisits a step.
pub fn run_cascade<T>(
    task: TaskKind,
    plan: &[PlanStep],
    events: Option<&EventWriter>,
    mut attempt: impl FnMut(usize, &PlanStep) -> Result<T, PipelineError>,
) -> CascadeReport<T> {
    let mut attempts = Vec::new();
    let mut state = if plan.is_empty() {
        CascadeState::Exhausted(PipelineError::UpstreamUnavailable(format!(
            "no fallback plan for {task}"
        )))
    } else {
        CascadeState::Pending(0)
    };

    loop {
        let idx = match state {
            CascadeState::Pending(idx) => idx,
            CascadeState::Succeeded(value) => {
                let step = attempts.last().map(|record: &AttemptRecord| record.step);
                return CascadeReport {
                    result: Ok(value),
                    step,
                    attempts,
                };
            }
            CascadeState::Exhausted(error) => {
                warn!(
                    task = %task,
                    attempts = attempts.len(),
                    kind = error.kind(),
                    error = %error,
                    "fallback cascade exhausted"
                );
                emit(events, "cascade_exhausted", {
                    let mut payload = EventPayload::new();
                    payload.insert("task".to_string(), json!(task.as_str()));
                    payload.insert("attempts".to_string(), json!(attempts.len()));
                    payload.insert("error_kind".to_string(), json!(error.kind()));
                    payload.insert(
                        "error".to_string(),
                        json!(truncate_text(&error.to_string(), RAW_EXCERPT_CHARS)),
                    );
                    payload
                });
                return CascadeReport {
                    result: Err(error),
                    step: None,
                    attempts,
                };
            }
        };

        let step = &plan[idx];
        let started = Instant::now();
        let outcome = attempt(idx, step);
        let latency = started.elapsed();

        state = match outcome {
            Ok(value) => {
                let record = AttemptRecord {
                    step: idx,
                    model: step.model.clone(),
                    variant: step.variant,
                    outcome: "ok",
                    latency,
                    error: None,
                };
                info!(
                    task = %task,
                    step = idx,
                    model = %step.model,
                    variant = %step.variant,
                    latency_ms = latency.as_millis() as u64,
                    "attempt succeeded"
                );
                emit(events, "attempt_succeeded", record.to_payload(task));
                attempts.push(record);
                CascadeState::Succeeded(value)
            }
            Err(error) => {
                let record = AttemptRecord {
                    step: idx,
                    model: step.model.clone(),
                    variant: step.variant,
                    outcome: error.kind(),
                    latency,
                    error: Some(truncate_text(&error.to_string(), RAW_EXCERPT_CHARS)),
                };
                warn!(
                    task = %task,
                    step = idx,
                    model = %step.model,
                    variant = %step.variant,
                    kind = error.kind(),
                    latency_ms = latency.as_millis() as u64,
                    reason = record.error.as_deref().unwrap_or_default(),
                    "attempt failed"
                );
                emit(events, "attempt_failed", record.to_payload(task));
                attempts.push(record);
                match next_step(plan, idx, &error) {
                    Some(next) => CascadeState::Pending(next),
                    None => CascadeState::Exhausted(error),
                }
            }
        };
    }
}

pub(crate) fn emit(events: Option<&EventWriter>, event_type: &str, payload: EventPayload) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(event_type, payload) {
        warn!(event_type, error = %err, "failed to append pipeline event");
    }
}

pub(crate) fn attempts_json(attempts: &[AttemptRecord]) -> Value {
    Value::Array(
        attempts
            .iter()
            .map(|record| {
                json!({
                    "step": record.step,
                    "model": record.model,
                    "variant": record.variant.as_str(),
                    "outcome": record.outcome,
                    "latencyMs": record.latency.as_millis() as u64,
                })
            })
            .collect(),
    )
}
