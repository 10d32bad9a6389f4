use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// First code point of the CJK Unified Ideographs block accepted as a kanji.
pub const CJK_IDEOGRAPH_START: char = '\u{4e00}';
/// Last code point accepted as a kanji (`\u{9faf}`, end of the common range).
pub const CJK_IDEOGRAPH_END: char = '\u{9faf}';

pub fn is_cjk_ideograph(ch: char) -> bool {
    (CJK_IDEOGRAPH_START..=CJK_IDEOGRAPH_END).contains(&ch)
}

/// Returns the single ideograph in `text`, or `None` when `text` holds anything
/// other than exactly one CJK ideograph after trimming.
pub fn single_ideograph(text: &str) -> Option<char> {
    let mut chars = text.trim().chars();
    let first = chars.next()?;
    if chars.next().is_some() || !is_cjk_ideograph(first) {
        return None;
    }
    Some(first)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JlptLevel {
    N5,
    N4,
    N3,
    N2,
    N1,
}

impl JlptLevel {
    pub const ALL: [JlptLevel; 5] = [
        JlptLevel::N5,
        JlptLevel::N4,
        JlptLevel::N3,
        JlptLevel::N2,
        JlptLevel::N1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JlptLevel::N5 => "N5",
            JlptLevel::N4 => "N4",
            JlptLevel::N3 => "N3",
            JlptLevel::N2 => "N2",
            JlptLevel::N1 => "N1",
        }
    }

    pub fn from_number(level: u64) -> Option<Self> {
        match level {
            5 => Some(JlptLevel::N5),
            4 => Some(JlptLevel::N4),
            3 => Some(JlptLevel::N3),
            2 => Some(JlptLevel::N2),
            1 => Some(JlptLevel::N1),
            _ => None,
        }
    }
}

impl fmt::Display for JlptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JlptLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        let digits = normalized
            .strip_prefix("JLPT")
            .map(str::trim)
            .unwrap_or(normalized.as_str());
        let Some(number) = digits.strip_prefix('N') else {
            return Err(format!("'{}' does not match N1..N5", raw.trim()));
        };
        number
            .parse::<u64>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| format!("'{}' does not match N1..N5", raw.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiExample {
    pub word: String,
    pub reading: String,
    pub meaning: String,
}

/// A recognized kanji with its readings and usage examples.
///
/// Only [`crate::kanji::validate`] constructs records from model output, so a
/// record in hand always satisfies the schema: one ideograph, non-empty on'yomi
/// and meanings, a positive stroke count and at least one complete example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiRecord {
    pub character: String,
    pub on_reading: Vec<String>,
    pub kun_reading: Vec<String>,
    pub meaning: Vec<String>,
    pub stroke_count: u32,
    pub jlpt_level: JlptLevel,
    pub examples: Vec<KanjiExample>,
}

impl KanjiRecord {
    pub fn ideograph(&self) -> Option<char> {
        single_ideograph(&self.character)
    }
}
