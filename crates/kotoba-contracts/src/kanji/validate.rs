use serde_json::{Map, Value};
use thiserror::Error;

use super::record::{single_ideograph, JlptLevel, KanjiExample, KanjiRecord};

/// Schema violation in a parsed model candidate. Always names the field so the
/// cascade can log a precise reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("candidate is not a JSON object")]
    NotAnObject,
    #[error("field `{field}` is missing")]
    Missing { field: &'static str },
    #[error("field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::NotAnObject => None,
            ValidationError::Missing { field } | ValidationError::Invalid { field, .. } => {
                Some(*field)
            }
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

const LIST_SEPARATORS: [char; 6] = [',', '、', '，', '/', ';', '・'];

pub fn validate(candidate: &Value) -> Result<KanjiRecord, ValidationError> {
    validate_expecting(candidate, None)
}

/// Validates a candidate and, when `expected` is set, requires the returned
/// character to be that ideograph.
pub fn validate_expecting(
    candidate: &Value,
    expected: Option<char>,
) -> Result<KanjiRecord, ValidationError> {
    let object = unwrap_record_object(candidate).ok_or(ValidationError::NotAnObject)?;

    let raw_character = field(object, &["character", "kanji", "char"])
        .ok_or(ValidationError::Missing { field: "character" })?;
    let character_text = raw_character
        .as_str()
        .ok_or_else(|| ValidationError::invalid("character", "expected a string"))?;
    let character = single_ideograph(character_text).ok_or_else(|| {
        ValidationError::invalid(
            "character",
            format!(
                "'{}' is not exactly one CJK ideograph",
                character_text.trim()
            ),
        )
    })?;
    if let Some(expected) = expected {
        if expected != character {
            return Err(ValidationError::invalid(
                "character",
                format!("expected '{expected}' but model returned '{character}'"),
            ));
        }
    }

    let on_reading = string_list(field(object, &["onReading", "on_reading", "onyomi"]))
        .ok_or(ValidationError::Missing { field: "onReading" })?;
    if on_reading.is_empty() {
        return Err(ValidationError::invalid("onReading", "must not be empty"));
    }

    let kun_reading = string_list(field(object, &["kunReading", "kun_reading", "kunyomi"]))
        .ok_or(ValidationError::Missing {
            field: "kunReading",
        })?;

    let meaning = string_list(field(object, &["meaning", "meanings"]))
        .ok_or(ValidationError::Missing { field: "meaning" })?;
    if meaning.is_empty() {
        return Err(ValidationError::invalid("meaning", "must not be empty"));
    }

    let stroke_count = stroke_count(field(object, &["strokeCount", "stroke_count", "strokes"]))?;
    let jlpt_level = jlpt_level(field(object, &["jlptLevel", "jlpt_level", "jlpt"]))?;
    let examples = examples(field(object, &["examples", "example"]))?;

    Ok(KanjiRecord {
        character: character.to_string(),
        on_reading,
        kun_reading,
        meaning,
        stroke_count,
        jlpt_level,
        examples,
    })
}

/// Models sometimes wrap the record (`{"kanji": {...}}` or `[{...}]`); unwrap one
/// level when the outer value is not itself the record.
fn unwrap_record_object(candidate: &Value) -> Option<&Map<String, Value>> {
    match candidate {
        Value::Object(object) => {
            if object.contains_key("character") || object.len() != 1 {
                return Some(object);
            }
            match object.values().next() {
                Some(Value::Object(inner)) => Some(inner),
                _ => Some(object),
            }
        }
        Value::Array(rows) if rows.len() == 1 => rows[0].as_object(),
        _ => None,
    }
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .filter(|value| !value.is_null())
}

/// Ordered, de-duplicated list of non-empty strings. A single string is split on
/// common list separators. `None` means the field was absent or unusable.
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let value = value?;
    let mut raw_items: Vec<String> = Vec::new();
    match value {
        Value::Array(rows) => {
            for row in rows {
                match row {
                    Value::String(text) => raw_items.push(text.clone()),
                    Value::Number(number) => raw_items.push(number.to_string()),
                    _ => {}
                }
            }
        }
        Value::String(text) => {
            raw_items.extend(text.split(LIST_SEPARATORS).map(str::to_string));
        }
        _ => return None,
    }

    let mut out: Vec<String> = Vec::new();
    for item in raw_items {
        let text = item.split_whitespace().collect::<Vec<&str>>().join(" ");
        if text.is_empty() || out.contains(&text) {
            continue;
        }
        out.push(text);
    }
    Some(out)
}

fn stroke_count(value: Option<&Value>) -> Result<u32, ValidationError> {
    let value = value.ok_or(ValidationError::Missing {
        field: "strokeCount",
    })?;
    let parsed = match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.fract() == 0.0 && *value >= 0.0)
                    .map(|value| value as u64)
            }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(count) if count > 0 && count <= u64::from(u32::MAX) => Ok(count as u32),
        Some(_) => Err(ValidationError::invalid(
            "strokeCount",
            "must be a positive integer",
        )),
        None => Err(ValidationError::invalid(
            "strokeCount",
            format!("expected an integer, got {value}"),
        )),
    }
}

fn jlpt_level(value: Option<&Value>) -> Result<JlptLevel, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field: "jlptLevel" })?;
    match value {
        Value::String(text) => text
            .parse::<JlptLevel>()
            .map_err(|reason| ValidationError::invalid("jlptLevel", reason)),
        other => Err(ValidationError::invalid(
            "jlptLevel",
            format!("expected N1..N5, got {other}"),
        )),
    }
}

fn examples(value: Option<&Value>) -> Result<Vec<KanjiExample>, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field: "examples" })?;
    let rows = value
        .as_array()
        .ok_or_else(|| ValidationError::invalid("examples", "expected an array"))?;
    if rows.is_empty() {
        return Err(ValidationError::invalid("examples", "must not be empty"));
    }

    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let entry = row.as_object().ok_or_else(|| {
            ValidationError::invalid("examples", format!("entry {} is not an object", idx + 1))
        })?;
        let text_of = |name: &str| {
            entry
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };
        let mut missing = Vec::new();
        let word = text_of("word");
        let reading = text_of("reading");
        let meaning = text_of("meaning");
        for (name, present) in [
            ("word", word.is_some()),
            ("reading", reading.is_some()),
            ("meaning", meaning.is_some()),
        ] {
            if !present {
                missing.push(name);
            }
        }
        match (word, reading, meaning) {
            (Some(word), Some(reading), Some(meaning)) => out.push(KanjiExample {
                word,
                reading,
                meaning,
            }),
            _ => {
                return Err(ValidationError::invalid(
                    "examples",
                    format!("entry {} is missing {}", idx + 1, missing.join(", ")),
                ))
            }
        }
    }
    Ok(out)
}
