use std::time::Duration;

use kotoba_contracts::api::{
    Language, STATUS_BAD_REQUEST, STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL,
    STATUS_TOO_MANY_REQUESTS, STATUS_UNAUTHORIZED, STATUS_UNAVAILABLE, STATUS_UNPROCESSABLE,
    STATUS_UNSUPPORTED_MEDIA_TYPE,
};
use kotoba_contracts::extract::ExtractionError;
use kotoba_contracts::kanji::ValidationError;
use thiserror::Error;

/// Everything that can go wrong between an inbound request and a typed result.
///
/// Caller-input problems (`Validation`, `UnsupportedMedia`) are surfaced
/// immediately. Model-side failures advance the fallback cascade and only
/// surface once the plan is exhausted.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),
    #[error("model call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("model refused the request (safety: {0})")]
    SafetyBlock(String),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("model returned an invalid result: {0}")]
    SemanticValidation(#[from] ValidationError),
    #[error("model unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("API key rejected: {0}")]
    Unauthorized(String),
    #[error("upstream rate limit: {0}")]
    RateLimited(String),
    #[error("upstream request failed ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("model returned no image data")]
    NoImageData,
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::UnsupportedMedia(_) => "unsupported_media",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::SafetyBlock(_) => "safety_block",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::SemanticValidation(_) => "semantic_validation",
            PipelineError::UpstreamUnavailable(_) => "upstream_unavailable",
            PipelineError::Unauthorized(_) => "unauthorized",
            PipelineError::RateLimited(_) => "rate_limited",
            PipelineError::Upstream { .. } => "upstream",
            PipelineError::Transport(_) => "transport",
            PipelineError::NoImageData => "no_image_data",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => STATUS_BAD_REQUEST,
            PipelineError::UnsupportedMedia(_) => STATUS_UNSUPPORTED_MEDIA_TYPE,
            PipelineError::Timeout(_) => STATUS_GATEWAY_TIMEOUT,
            PipelineError::SafetyBlock(_)
            | PipelineError::Extraction(_)
            | PipelineError::SemanticValidation(_) => STATUS_UNPROCESSABLE,
            PipelineError::UpstreamUnavailable(_) => STATUS_UNAVAILABLE,
            PipelineError::Unauthorized(_) => STATUS_UNAUTHORIZED,
            PipelineError::RateLimited(_) => STATUS_TOO_MANY_REQUESTS,
            PipelineError::Upstream { .. }
            | PipelineError::Transport(_)
            | PipelineError::NoImageData => STATUS_INTERNAL,
        }
    }

    /// Whether a later cascade step could still succeed after this failure.
    pub fn advances_cascade(&self) -> bool {
        !matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::UnsupportedMedia(_)
                | PipelineError::Unauthorized(_)
        )
    }

    /// Short user-facing explanation in the caller's language.
    pub fn fallback_message(&self, language: Language) -> &'static str {
        match (self, language) {
            (PipelineError::Validation(_), Language::Ja) => {
                "入力内容を確認してください。"
            }
            (PipelineError::Validation(_), Language::En) => {
                "Please check your input and try again."
            }
            (PipelineError::UnsupportedMedia(_), Language::Ja) => {
                "対応していない形式です。PNG または JPEG の画像を送信してください。"
            }
            (PipelineError::UnsupportedMedia(_), Language::En) => {
                "Unsupported format. Please send a PNG or JPEG image as JSON."
            }
            (PipelineError::Timeout(_), Language::Ja) => {
                "応答に時間がかかっています。しばらくしてからもう一度お試しください。"
            }
            (PipelineError::Timeout(_), Language::En) => {
                "The AI is taking too long to respond. Please try again in a moment."
            }
            (
                PipelineError::SafetyBlock(_)
                | PipelineError::Extraction(_)
                | PipelineError::SemanticValidation(_),
                Language::Ja,
            ) => "うまく認識できませんでした。もう少し丁寧に書いて、もう一度お試しください。",
            (
                PipelineError::SafetyBlock(_)
                | PipelineError::Extraction(_)
                | PipelineError::SemanticValidation(_),
                Language::En,
            ) => "We couldn't get a clear answer. Try writing more clearly or rephrasing.",
            (PipelineError::UpstreamUnavailable(_), Language::Ja) => {
                "AI モデルが現在利用できません。管理者にお問い合わせください。"
            }
            (PipelineError::UpstreamUnavailable(_), Language::En) => {
                "The AI model is currently unavailable. Please contact the administrator."
            }
            (PipelineError::Unauthorized(_), Language::Ja) => {
                "API キーが無効です。設定を確認してください。"
            }
            (PipelineError::Unauthorized(_), Language::En) => {
                "The API key is invalid. Please check your settings."
            }
            (PipelineError::RateLimited(_), Language::Ja) => {
                "リクエストが多すぎます。少し待ってからもう一度お試しください。"
            }
            (PipelineError::RateLimited(_), Language::En) => {
                "Too many requests. Please wait a moment and try again."
            }
            (_, Language::Ja) => "エラーが発生しました。もう一度お試しください。",
            (_, Language::En) => "Something went wrong. Please try again.",
        }
    }
}
