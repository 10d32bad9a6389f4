use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kanji::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TranslationResult {
    pub fn from_candidate(candidate: &Value) -> Result<Self, ValidationError> {
        let object = candidate.as_object().ok_or(ValidationError::NotAnObject)?;
        let translation = required_text(object, "translation", &["translation", "translatedText"])?;
        Ok(Self {
            translation,
            reading: optional_text(object, &["reading", "romaji", "furigana"]),
            notes: optional_text(object, &["notes", "note", "explanation"]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyWord {
    pub word: String,
    pub reading: String,
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyList {
    pub words: Vec<VocabularyWord>,
}

impl VocabularyList {
    /// Accepts `{"words": [...]}`, `{"vocabulary": [...]}` or a bare array.
    /// Incomplete entries are dropped; at most `limit` words are kept.
    pub fn from_candidate(candidate: &Value, limit: usize) -> Result<Self, ValidationError> {
        let rows = match candidate {
            Value::Array(rows) => rows,
            Value::Object(object) => ["words", "vocabulary", "items"]
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_array))
                .ok_or(ValidationError::Missing { field: "words" })?,
            _ => return Err(ValidationError::NotAnObject),
        };
        let words: Vec<VocabularyWord> = rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| {
                Some(VocabularyWord {
                    word: required_text(row, "word", &["word", "japanese"]).ok()?,
                    reading: required_text(row, "reading", &["reading", "kana"]).ok()?,
                    meaning: required_text(row, "meaning", &["meaning", "english"]).ok()?,
                    example: optional_text(row, &["example", "exampleSentence"]),
                })
            })
            .take(limit)
            .collect();
        if words.is_empty() {
            return Err(ValidationError::Invalid {
                field: "words",
                reason: "no complete entries".to_string(),
            });
        }
        Ok(Self { words })
    }
}

/// A generated (or placeholder) image for a single kanji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiImage {
    pub character: String,
    pub data_url: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub placeholder: bool,
}

fn required_text(
    object: &Map<String, Value>,
    field: &'static str,
    keys: &[&str],
) -> Result<String, ValidationError> {
    let value = keys
        .iter()
        .find_map(|key| object.get(*key))
        .ok_or(ValidationError::Missing { field })?;
    let text = value.as_str().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(ValidationError::Invalid {
            field,
            reason: "must be a non-empty string".to_string(),
        });
    }
    Ok(text.to_string())
}

fn optional_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{TranslationResult, VocabularyList};
    use crate::kanji::ValidationError;

    #[test]
    fn translation_requires_text() {
        let parsed = TranslationResult::from_candidate(&json!({
            "translation": "Good morning",
            "reading": "ohayou gozaimasu",
            "notes": ""
        }))
        .unwrap();
        assert_eq!(parsed.translation, "Good morning");
        assert_eq!(parsed.notes, None);

        assert_eq!(
            TranslationResult::from_candidate(&json!({"translation": "  "}))
                .unwrap_err()
                .field(),
            Some("translation")
        );
    }

    #[test]
    fn vocabulary_drops_incomplete_rows_and_honours_limit() {
        let candidate = json!({"vocabulary": [
            {"word": "りんご", "reading": "りんご", "meaning": "apple"},
            {"word": "水", "meaning": "water"},
            {"word": "パン", "reading": "ぱん", "meaning": "bread", "example": "パンを食べる。"},
            {"word": "魚", "reading": "さかな", "meaning": "fish"}
        ]});
        let list = VocabularyList::from_candidate(&candidate, 2).unwrap();
        let words: Vec<&str> = list.words.iter().map(|row| row.word.as_str()).collect();
        assert_eq!(words, vec!["りんご", "パン"]);
        assert_eq!(list.words[1].example.as_deref(), Some("パンを食べる。"));
    }

    #[test]
    fn vocabulary_without_rows_is_rejected() {
        assert_eq!(
            VocabularyList::from_candidate(&json!({"topic": "food"}), 5),
            Err(ValidationError::Missing { field: "words" })
        );
        assert!(VocabularyList::from_candidate(&json!([]), 5).is_err());
    }
}
