use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::{GenerateRequest, GenerateResponse, GenerativeTransport, Part};
use crate::error::PipelineError;

/// One canned reply, optionally delivered after a delay.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub delay: Duration,
    pub result: Result<GenerateResponse, PipelineError>,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::respond(GenerateResponse::from_text(text))
    }

    pub fn image(mime_type: &str, base64: &str) -> Self {
        Self::respond(GenerateResponse::from_image(mime_type, base64))
    }

    pub fn safety_block(finish_reason: &str) -> Self {
        Self::respond(GenerateResponse::blocked(finish_reason))
    }

    pub fn respond(response: GenerateResponse) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(response),
        }
    }

    pub fn error(err: PipelineError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(err),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub variant: Option<String>,
    pub parts: Vec<Part>,
    pub timeout: Duration,
}

/// In-memory transport that replays a fixed script and records every call.
/// An exhausted script answers with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> PipelineError {
    PipelineError::Transport("scripted transport lock poisoned".to_string())
}

impl GenerativeTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        self.calls.lock().map_err(poisoned)?.push(RecordedCall {
            model: request.model.clone(),
            variant: request.metadata_str("variant").map(str::to_string),
            parts: request.parts.clone(),
            timeout: request.timeout,
        });
        let reply = self.replies.lock().map_err(poisoned)?.pop_front();
        let Some(reply) = reply else {
            return Err(PipelineError::Transport("script exhausted".to_string()));
        };
        if !reply.delay.is_zero() {
            thread::sleep(reply.delay);
        }
        reply.result
    }
}
