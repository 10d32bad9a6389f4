use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kanji::{single_ideograph, JlptLevel};

use super::data_url::{parse_image_data_url, DataUrlError, ImageDataUrl};

pub const CHAT_MESSAGE_MAX_CHARS: usize = 1000;
pub const CHAT_CONTEXT_MAX_CHARS: usize = 4000;
pub const TRANSLATE_TEXT_MAX_CHARS: usize = 2000;
pub const VOCABULARY_TOPIC_MAX_CHARS: usize = 100;
pub const VOCABULARY_DEFAULT_COUNT: u32 = 10;
pub const VOCABULARY_MAX_COUNT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("field `{field}`: {source}")]
    Image {
        field: &'static str,
        #[source]
        source: DataUrlError,
    },
}

impl RequestError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RequestError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            RequestError::Invalid { field, .. } | RequestError::Image { field, .. } => *field,
        }
    }

    /// Unsupported image types map to 415 rather than 400.
    pub fn is_unsupported_media(&self) -> bool {
        matches!(
            self,
            RequestError::Image {
                source: DataUrlError::UnsupportedMime(_),
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ja,
    #[default]
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ja => "ja",
            Language::En => "en",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Ja => "Japanese",
            Language::En => "English",
        }
    }

    pub fn other(&self) -> Language {
        match self {
            Language::Ja => Language::En,
            Language::En => Language::Ja,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        bounded_text("message", &self.message, CHAT_MESSAGE_MAX_CHARS)?;
        if let Some(context) = &self.context {
            if context.chars().count() > CHAT_CONTEXT_MAX_CHARS {
                return Err(RequestError::invalid(
                    "context",
                    format!("must be at most {CHAT_CONTEXT_MAX_CHARS} characters"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default)]
    pub target_language: Option<Language>,
}

impl TranslateRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        bounded_text("text", &self.text, TRANSLATE_TEXT_MAX_CHARS)
    }

    /// Explicit target, else the opposite of whatever script the text is in.
    pub fn target(&self) -> Language {
        self.target_language.unwrap_or_else(|| {
            if contains_japanese(&self.text) {
                Language::En
            } else {
                Language::Ja
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub image: String,
    #[serde(default)]
    pub model_hint: Option<String>,
}

impl RecognizeRequest {
    pub fn decode_image(&self) -> Result<ImageDataUrl, RequestError> {
        parse_image_data_url(&self.image).map_err(|source| RequestError::Image {
            field: "image",
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub character: String,
}

impl LookupRequest {
    pub fn ideograph(&self) -> Result<char, RequestError> {
        single_ideograph(&self.character).ok_or_else(|| {
            RequestError::invalid("character", "must be exactly one kanji")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyRequest {
    pub topic: String,
    #[serde(default)]
    pub level: Option<JlptLevel>,
    #[serde(default)]
    pub count: Option<u32>,
}

impl VocabularyRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        bounded_text("topic", &self.topic, VOCABULARY_TOPIC_MAX_CHARS)?;
        if let Some(count) = self.count {
            if !(1..=VOCABULARY_MAX_COUNT).contains(&count) {
                return Err(RequestError::invalid(
                    "count",
                    format!("must be between 1 and {VOCABULARY_MAX_COUNT}"),
                ));
            }
        }
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.count.unwrap_or(VOCABULARY_DEFAULT_COUNT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiImageRequest {
    pub character: String,
    #[serde(default)]
    pub style: Option<String>,
}

impl KanjiImageRequest {
    pub fn ideograph(&self) -> Result<char, RequestError> {
        single_ideograph(&self.character).ok_or_else(|| {
            RequestError::invalid("character", "must be exactly one kanji")
        })
    }
}

fn bounded_text(field: &'static str, text: &str, max_chars: usize) -> Result<(), RequestError> {
    let length = text.trim().chars().count();
    if length == 0 {
        return Err(RequestError::invalid(field, "must not be empty"));
    }
    if length > max_chars {
        return Err(RequestError::invalid(
            field,
            format!("must be at most {max_chars} characters"),
        ));
    }
    Ok(())
}

fn contains_japanese(text: &str) -> bool {
    text.chars().any(|ch| {
        matches!(ch, '\u{3040}'..='\u{30ff}') || crate::kanji::is_cjk_ideograph(ch)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn chat_message_length_is_bounded() {
        let ok: ChatRequest = serde_json::from_value(json!({"message": "こんにちは"})).unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.language, None);

        let empty = ChatRequest {
            message: "   ".to_string(),
            context: None,
            language: None,
        };
        assert_eq!(empty.validate().unwrap_err().field(), "message");

        let long = ChatRequest {
            message: "あ".repeat(CHAT_MESSAGE_MAX_CHARS + 1),
            context: None,
            language: Some(Language::Ja),
        };
        assert!(long.validate().is_err());
        let limit = ChatRequest {
            message: "あ".repeat(CHAT_MESSAGE_MAX_CHARS),
            ..long
        };
        assert!(limit.validate().is_ok());
    }

    #[test]
    fn translate_target_defaults_to_other_script() {
        let to_en: TranslateRequest = serde_json::from_value(json!({"text": "日本語"})).unwrap();
        assert_eq!(to_en.target(), Language::En);
        let to_ja: TranslateRequest = serde_json::from_value(json!({"text": "good morning"})).unwrap();
        assert_eq!(to_ja.target(), Language::Ja);
        let explicit: TranslateRequest =
            serde_json::from_value(json!({"text": "日本語", "targetLanguage": "ja"})).unwrap();
        assert_eq!(explicit.target(), Language::Ja);
    }

    #[test]
    fn lookup_requires_single_kanji() {
        let lookup = LookupRequest {
            character: "日".to_string(),
        };
        assert_eq!(lookup.ideograph(), Ok('日'));
        let word = LookupRequest {
            character: "日本".to_string(),
        };
        assert!(word.ideograph().is_err());
    }

    #[test]
    fn recognize_rejects_unsupported_image_type_as_media_error() {
        let request = RecognizeRequest {
            image: "data:image/webp;base64,UklGRg==".to_string(),
            model_hint: None,
        };
        let err = request.decode_image().unwrap_err();
        assert!(err.is_unsupported_media());

        let garbage = RecognizeRequest {
            image: "not an image".to_string(),
            model_hint: None,
        };
        assert!(!garbage.decode_image().unwrap_err().is_unsupported_media());
    }

    #[test]
    fn vocabulary_count_is_bounded() {
        let request: VocabularyRequest =
            serde_json::from_value(json!({"topic": "food", "level": "N4"})).unwrap();
        assert_eq!(request.level, Some(JlptLevel::N4));
        assert_eq!(request.count(), VOCABULARY_DEFAULT_COUNT);
        let too_many = VocabularyRequest {
            count: Some(VOCABULARY_MAX_COUNT + 1),
            ..request
        };
        assert_eq!(too_many.validate().unwrap_err().field(), "count");
    }
}
