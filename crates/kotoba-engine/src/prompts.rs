use std::fmt;

use kotoba_contracts::api::{ImageDataUrl, Language};
use kotoba_contracts::kanji::JlptLevel;
use serde_json::{json, Map, Value};

use crate::transport::{GenerationParams, Part, ResponseModality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Recognize,
    Lookup,
    Chat,
    Translate,
    Vocabulary,
    KanjiImage,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Recognize,
        TaskKind::Lookup,
        TaskKind::Chat,
        TaskKind::Translate,
        TaskKind::Vocabulary,
        TaskKind::KanjiImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Recognize => "recognize",
            TaskKind::Lookup => "lookup",
            TaskKind::Chat => "chat",
            TaskKind::Translate => "translate",
            TaskKind::Vocabulary => "vocabulary",
            TaskKind::KanjiImage => "kanji_image",
        }
    }

    pub fn env_suffix(&self) -> &'static str {
        match self {
            TaskKind::Recognize => "RECOGNIZE",
            TaskKind::Lookup => "LOOKUP",
            TaskKind::Chat => "CHAT",
            TaskKind::Translate => "TRANSLATE",
            TaskKind::Vocabulary => "VOCABULARY",
            TaskKind::KanjiImage => "KANJI_IMAGE",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptVariant {
    /// Verbose schema with field comments and safety caveats.
    Full,
    /// Neutral, explicitly educational wording for retries after a safety block.
    Sanitized,
    /// Shortest instruction, lowest temperature.
    Minimal,
}

impl PromptVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVariant::Full => "full",
            PromptVariant::Sanitized => "sanitized",
            PromptVariant::Minimal => "minimal",
        }
    }

    pub const fn params(&self) -> GenerationParams {
        match self {
            PromptVariant::Full => GenerationParams::new(0.4, 0.95, 40, 2048),
            PromptVariant::Sanitized => GenerationParams::new(0.2, 0.9, 32, 1536),
            PromptVariant::Minimal => GenerationParams::new(0.1, 0.8, 16, 1024),
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed parameters for one task invocation.
#[derive(Debug, Clone)]
pub enum TaskInput {
    Recognize {
        image: ImageDataUrl,
    },
    Lookup {
        character: char,
    },
    Chat {
        message: String,
        context: Option<String>,
        language: Language,
    },
    Translate {
        text: String,
        target: Language,
    },
    Vocabulary {
        topic: String,
        level: Option<JlptLevel>,
        count: u32,
    },
    KanjiImage {
        character: char,
        style: Option<String>,
    },
}

impl TaskInput {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskInput::Recognize { .. } => TaskKind::Recognize,
            TaskInput::Lookup { .. } => TaskKind::Lookup,
            TaskInput::Chat { .. } => TaskKind::Chat,
            TaskInput::Translate { .. } => TaskKind::Translate,
            TaskInput::Vocabulary { .. } => TaskKind::Vocabulary,
            TaskInput::KanjiImage { .. } => TaskKind::KanjiImage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub parts: Vec<Part>,
    pub modality: ResponseModality,
    pub metadata: Map<String, Value>,
}

impl Prompt {
    pub fn instruction(&self) -> &str {
        self.parts
            .iter()
            .find_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .unwrap_or_default()
    }
}

const KANJI_SCHEMA_FULL: &str = r#"{
  "character": "日",            // exactly one kanji, never kana or punctuation
  "onReading": ["ニチ", "ジツ"],  // on'yomi in katakana, at least one
  "kunReading": ["ひ", "か"],     // kun'yomi in hiragana, may be an empty list
  "meaning": ["sun", "day"],     // English meanings, at least one
  "strokeCount": 4,              // positive integer
  "jlptLevel": "N5",             // one of N5, N4, N3, N2, N1
  "examples": [                  // at least one, every field filled in
    {"word": "日本", "reading": "にほん", "meaning": "Japan"}
  ]
}"#;

const KANJI_SCHEMA_COMPACT: &str = r#"{"character":"","onReading":[],"kunReading":[],"meaning":[],"strokeCount":0,"jlptLevel":"N5","examples":[{"word":"","reading":"","meaning":""}]}"#;

const JSON_ONLY: &str = "Respond with the JSON object only. Do not add explanations or markdown.";

pub fn build_prompt(input: &TaskInput, variant: PromptVariant) -> Prompt {
    let mut metadata = Map::new();
    metadata.insert("task".to_string(), json!(input.kind().as_str()));
    metadata.insert("variant".to_string(), json!(variant.as_str()));

    let (parts, modality) = match input {
        TaskInput::Recognize { image } => (
            vec![
                Part::text(recognize_text(variant)),
                Part::inline(image.mime_type, image.base64.clone()),
            ],
            ResponseModality::Text,
        ),
        TaskInput::Lookup { character } => {
            metadata.insert("character".to_string(), json!(character.to_string()));
            (vec![Part::text(lookup_text(*character, variant))], ResponseModality::Text)
        }
        TaskInput::Chat {
            message,
            context,
            language,
        } => {
            metadata.insert("message".to_string(), json!(message));
            metadata.insert("language".to_string(), json!(language.as_str()));
            (
                vec![Part::text(chat_text(message, context.as_deref(), *language, variant))],
                ResponseModality::Text,
            )
        }
        TaskInput::Translate { text, target } => {
            metadata.insert("text".to_string(), json!(text));
            metadata.insert("target".to_string(), json!(target.as_str()));
            (
                vec![Part::text(translate_text(text, *target, variant))],
                ResponseModality::Text,
            )
        }
        TaskInput::Vocabulary {
            topic,
            level,
            count,
        } => {
            metadata.insert("topic".to_string(), json!(topic));
            metadata.insert("count".to_string(), json!(count));
            (
                vec![Part::text(vocabulary_text(topic, *level, *count, variant))],
                ResponseModality::Text,
            )
        }
        TaskInput::KanjiImage { character, style } => {
            metadata.insert("character".to_string(), json!(character.to_string()));
            (
                vec![Part::text(kanji_image_text(*character, style.as_deref(), variant))],
                ResponseModality::Image,
            )
        }
    };

    Prompt {
        parts,
        modality,
        metadata,
    }
}

fn recognize_text(variant: PromptVariant) -> String {
    match variant {
        PromptVariant::Full => format!(
            "You are an expert Japanese calligraphy teacher helping a student who is learning to write kanji.\n\
             The attached image is a single handwritten kanji drawn in black on a white background.\n\n\
             Steps:\n\
             1. Look at the overall shape, the number of strokes and their positions.\n\
             2. Decide which single kanji the student most likely intended. Handwriting may be imperfect.\n\
             3. Fill in its readings, meanings, stroke count, JLPT level and one to three common example words.\n\n\
             Output schema (comments describe each field and must not appear in your answer):\n\
             {KANJI_SCHEMA_FULL}\n\n\
             If the drawing is unclear, still return your best guess as a kanji.\n\
             {JSON_ONLY}"
        ),
        PromptVariant::Sanitized => format!(
            "This is an educational handwriting exercise for a Japanese language class.\n\
             The image shows one handwritten Japanese character. Identify the character and describe it \
             for a dictionary entry.\n\
             Return JSON in this shape:\n{KANJI_SCHEMA_COMPACT}\n{JSON_ONLY}"
        ),
        PromptVariant::Minimal => format!(
            "Identify the handwritten kanji in the image. Return JSON: {KANJI_SCHEMA_COMPACT}"
        ),
    }
}

fn lookup_text(character: char, variant: PromptVariant) -> String {
    match variant {
        PromptVariant::Full => format!(
            "You are a Japanese kanji dictionary.\n\
             Describe the kanji 「{character}」 for a learner.\n\n\
             Steps:\n\
             1. List its on'yomi in katakana and kun'yomi in hiragana.\n\
             2. Give its core English meanings.\n\
             3. Give its stroke count and JLPT level.\n\
             4. Give one to three common words that contain 「{character}」.\n\n\
             Output schema (comments describe each field and must not appear in your answer):\n\
             {KANJI_SCHEMA_FULL}\n\n\
             The \"character\" field must be exactly 「{character}」.\n\
             {JSON_ONLY}"
        ),
        PromptVariant::Sanitized => format!(
            "For a Japanese language textbook, write the dictionary entry of the kanji 「{character}」.\n\
             Return JSON in this shape:\n{KANJI_SCHEMA_COMPACT}\n{JSON_ONLY}"
        ),
        PromptVariant::Minimal => format!(
            "Kanji 「{character}」 as JSON: {KANJI_SCHEMA_COMPACT}"
        ),
    }
}

fn chat_text(
    message: &str,
    context: Option<&str>,
    language: Language,
    variant: PromptVariant,
) -> String {
    let context_block = context
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| format!("Conversation so far:\n{text}\n\n"))
        .unwrap_or_default();
    match variant {
        PromptVariant::Full => format!(
            "You are a friendly Japanese conversation partner for a language learner.\n\
             Reply in {language}, using simple sentences suited to a beginner. When you use kanji, \
             add the reading in parentheses the first time. Gently correct mistakes in the \
             learner's Japanese if there are any.\n\
             Keep the reply under 120 words and avoid sensitive topics.\n\n\
             {context_block}Learner: {message}\n\
             Reply with plain text only.",
            language = language.display_name(),
        ),
        PromptVariant::Sanitized => format!(
            "You are a polite teaching assistant in a Japanese class. Reply briefly in {} to the \
             student's message below, keeping the conversation educational.\n\n\
             {context_block}Student: {message}",
            language.display_name()
        ),
        PromptVariant::Minimal => format!(
            "Reply briefly in {} to: {message}",
            language.display_name()
        ),
    }
}

fn translate_text(text: &str, target: Language, variant: PromptVariant) -> String {
    let source = target.other();
    match variant {
        PromptVariant::Full => format!(
            "You are a professional translator helping a Japanese learner.\n\
             Translate the following {source} text into natural {target}.\n\n\
             Steps:\n\
             1. Translate the meaning faithfully, keeping the tone.\n\
             2. If the result is Japanese, give its reading in romaji; otherwise give the romaji of \
             the original.\n\
             3. Add a short note about any grammar point or nuance worth learning.\n\n\
             Output schema:\n\
             {{\"translation\": \"...\", \"reading\": \"...\", \"notes\": \"...\"}}\n\n\
             Text:\n{text}\n\n{JSON_ONLY}",
            source = source.display_name(),
            target = target.display_name(),
        ),
        PromptVariant::Sanitized => format!(
            "For a language class, translate this {} text into {}. \
             Return JSON {{\"translation\": \"...\"}}.\n\nText:\n{text}",
            source.display_name(),
            target.display_name()
        ),
        PromptVariant::Minimal => format!(
            "Translate to {}: {text}\nJSON: {{\"translation\": \"...\"}}",
            target.display_name()
        ),
    }
}

fn vocabulary_text(
    topic: &str,
    level: Option<JlptLevel>,
    count: u32,
    variant: PromptVariant,
) -> String {
    let level_text = level
        .map(|level| format!(" at JLPT {level} level"))
        .unwrap_or_default();
    match variant {
        PromptVariant::Full => format!(
            "You are a Japanese teacher preparing a vocabulary list.\n\
             List {count} useful Japanese words about \"{topic}\"{level_text}.\n\n\
             Output schema (comments must not appear in your answer):\n\
             {{\n\
               \"words\": [\n\
                 {{\n\
                   \"word\": \"りんご\",       // the word as normally written\n\
                   \"reading\": \"りんご\",    // reading in hiragana\n\
                   \"meaning\": \"apple\",     // English meaning\n\
                   \"example\": \"りんごを食べます。\" // optional short example sentence\n\
                 }}\n\
               ]\n\
             }}\n\n{JSON_ONLY}"
        ),
        PromptVariant::Sanitized => format!(
            "For a Japanese textbook chapter about \"{topic}\", list {count} everyday words{level_text}. \
             Return JSON {{\"words\": [{{\"word\": \"\", \"reading\": \"\", \"meaning\": \"\"}}]}}."
        ),
        PromptVariant::Minimal => format!(
            "{count} Japanese words about {topic} as JSON {{\"words\":[{{\"word\":\"\",\"reading\":\"\",\"meaning\":\"\"}}]}}"
        ),
    }
}

fn kanji_image_text(character: char, style: Option<&str>, variant: PromptVariant) -> String {
    let style = style
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or("clean brush calligraphy");
    match variant {
        PromptVariant::Full => format!(
            "Create a square study card image for the Japanese kanji 「{character}」.\n\
             Draw the kanji large and centred in {style}, black ink on a plain off-white background, \
             with generous margins. Do not add any other text, people or logos."
        ),
        PromptVariant::Sanitized => format!(
            "Educational flash card: the single Japanese character 「{character}」 written in black ink \
             on a white background."
        ),
        PromptVariant::Minimal => format!("Kanji 「{character}」, black on white."),
    }
}

#[cfg(test)]
mod tests {
    use kotoba_contracts::api::{parse_image_data_url, Language};
    use kotoba_contracts::kanji::JlptLevel;

    use super::{build_prompt, PromptVariant, TaskInput, TaskKind};
    use crate::transport::{Part, ResponseModality};

    #[test]
    fn recognition_prompt_carries_inline_image_and_schema() {
        let image = parse_image_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        let prompt = build_prompt(&TaskInput::Recognize { image }, PromptVariant::Full);
        assert_eq!(prompt.parts.len(), 2);
        assert!(matches!(
            &prompt.parts[1],
            Part::InlineData { mime_type, .. } if mime_type == "image/png"
        ));
        assert!(prompt.instruction().contains("\"jlptLevel\""));
        assert!(prompt.instruction().contains("Steps:"));
        assert_eq!(prompt.metadata["task"], "recognize");
        assert_eq!(prompt.metadata["variant"], "full");
    }

    #[test]
    fn variants_get_shorter_and_cooler() {
        let input = TaskInput::Lookup { character: '水' };
        let full = build_prompt(&input, PromptVariant::Full);
        let sanitized = build_prompt(&input, PromptVariant::Sanitized);
        let minimal = build_prompt(&input, PromptVariant::Minimal);
        assert!(full.instruction().len() > sanitized.instruction().len());
        assert!(sanitized.instruction().len() > minimal.instruction().len());
        assert!(minimal.instruction().contains('水'));
        assert!(
            PromptVariant::Minimal.params().temperature < PromptVariant::Full.params().temperature
        );
        assert!(sanitized.instruction().contains("textbook"));
    }

    #[test]
    fn chat_prompt_follows_caller_language_and_context() {
        let prompt = build_prompt(
            &TaskInput::Chat {
                message: "おはよう".to_string(),
                context: Some("Learner: こんにちは".to_string()),
                language: Language::Ja,
            },
            PromptVariant::Full,
        );
        assert!(prompt.instruction().contains("Reply in Japanese"));
        assert!(prompt.instruction().contains("Conversation so far"));
        assert_eq!(prompt.modality, ResponseModality::Text);
    }

    #[test]
    fn vocabulary_prompt_mentions_level_and_count() {
        let prompt = build_prompt(
            &TaskInput::Vocabulary {
                topic: "food".to_string(),
                level: Some(JlptLevel::N4),
                count: 7,
            },
            PromptVariant::Full,
        );
        assert!(prompt.instruction().contains("List 7"));
        assert!(prompt.instruction().contains("JLPT N4"));
    }

    #[test]
    fn kanji_image_asks_for_image_modality() {
        let prompt = build_prompt(
            &TaskInput::KanjiImage {
                character: '山',
                style: None,
            },
            PromptVariant::Sanitized,
        );
        assert_eq!(prompt.modality, ResponseModality::Image);
        assert_eq!(TaskKind::KanjiImage.as_str(), "kanji_image");
    }
}
