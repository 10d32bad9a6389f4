use std::collections::VecDeque;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{GenerateRequest, GenerateResponse, GenerativeTransport, Part};
use crate::error::PipelineError;

const DRYRUN_IMAGE_SIZE: u32 = 256;
const INK_THRESHOLD: u8 = 128;
/// Smaller white pockets are pen-joint artefacts, not counters of a glyph.
const MIN_ENCLOSED_PIXELS: usize = 64;

struct OfflineKanji {
    character: &'static str,
    on_reading: &'static [&'static str],
    kun_reading: &'static [&'static str],
    meaning: &'static [&'static str],
    stroke_count: u32,
    jlpt_level: &'static str,
    examples: &'static [(&'static str, &'static str, &'static str)],
}

const OFFLINE_KANJI: &[OfflineKanji] = &[
    OfflineKanji {
        character: "日",
        on_reading: &["ニチ", "ジツ"],
        kun_reading: &["ひ", "か"],
        meaning: &["sun", "day"],
        stroke_count: 4,
        jlpt_level: "N5",
        examples: &[
            ("日本", "にほん", "Japan"),
            ("毎日", "まいにち", "every day"),
        ],
    },
    OfflineKanji {
        character: "月",
        on_reading: &["ゲツ", "ガツ"],
        kun_reading: &["つき"],
        meaning: &["moon", "month"],
        stroke_count: 4,
        jlpt_level: "N5",
        examples: &[("月曜日", "げつようび", "Monday"), ("今月", "こんげつ", "this month")],
    },
    OfflineKanji {
        character: "口",
        on_reading: &["コウ", "ク"],
        kun_reading: &["くち"],
        meaning: &["mouth", "opening"],
        stroke_count: 3,
        jlpt_level: "N5",
        examples: &[("入口", "いりぐち", "entrance"), ("人口", "じんこう", "population")],
    },
    OfflineKanji {
        character: "木",
        on_reading: &["ボク", "モク"],
        kun_reading: &["き", "こ"],
        meaning: &["tree", "wood"],
        stroke_count: 4,
        jlpt_level: "N5",
        examples: &[("木曜日", "もくようび", "Thursday"), ("大木", "たいぼく", "large tree")],
    },
    OfflineKanji {
        character: "山",
        on_reading: &["サン", "セン"],
        kun_reading: &["やま"],
        meaning: &["mountain"],
        stroke_count: 3,
        jlpt_level: "N5",
        examples: &[("富士山", "ふじさん", "Mount Fuji"), ("山道", "やまみち", "mountain path")],
    },
    OfflineKanji {
        character: "水",
        on_reading: &["スイ"],
        kun_reading: &["みず"],
        meaning: &["water"],
        stroke_count: 4,
        jlpt_level: "N5",
        examples: &[("水曜日", "すいようび", "Wednesday"), ("水道", "すいどう", "water supply")],
    },
    OfflineKanji {
        character: "火",
        on_reading: &["カ"],
        kun_reading: &["ひ", "ほ"],
        meaning: &["fire"],
        stroke_count: 4,
        jlpt_level: "N5",
        examples: &[("火曜日", "かようび", "Tuesday"), ("花火", "はなび", "fireworks")],
    },
];

impl OfflineKanji {
    fn to_json(&self) -> Value {
        json!({
            "character": self.character,
            "onReading": self.on_reading,
            "kunReading": self.kun_reading,
            "meaning": self.meaning,
            "strokeCount": self.stroke_count,
            "jlptLevel": self.jlpt_level,
            "examples": self
                .examples
                .iter()
                .map(|(word, reading, meaning)| json!({
                    "word": word,
                    "reading": reading,
                    "meaning": meaning,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

fn offline_kanji(character: &str) -> Option<&'static OfflineKanji> {
    OFFLINE_KANJI
        .iter()
        .find(|entry| entry.character == character.trim())
}

/// Offline guess from a drawing's topology: two enclosed counters read as 日,
/// one as 口. Anything else is left unrecognized.
fn offline_guess(enclosed: usize) -> Option<&'static str> {
    match enclosed {
        2 => Some("日"),
        1 => Some("口"),
        _ => None,
    }
}

/// Counts white regions fully surrounded by ink (the counters of 日, 口, ...).
pub(crate) fn enclosed_regions(image: &GrayImage) -> usize {
    let (width, height) = image.dimensions();
    let is_paper = |x: u32, y: u32| image.get_pixel(x, y).0[0] >= INK_THRESHOLD;
    let mut seen = vec![false; (width as usize) * (height as usize)];
    let index = |x: u32, y: u32| (y as usize) * (width as usize) + x as usize;

    let flood = |seeds: Vec<(u32, u32)>, seen: &mut [bool]| -> usize {
        let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
        for (x, y) in seeds {
            if is_paper(x, y) && !seen[index(x, y)] {
                seen[index(x, y)] = true;
                queue.push_back((x, y));
            }
        }
        let mut size = 0;
        while let Some((x, y)) = queue.pop_front() {
            size += 1;
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx < width && ny < height && !seen[index(nx, ny)] && is_paper(nx, ny) {
                    seen[index(nx, ny)] = true;
                    queue.push_back((nx, ny));
                }
            }
        }
        size
    };

    let mut border = Vec::new();
    for x in 0..width {
        border.push((x, 0));
        border.push((x, height.saturating_sub(1)));
    }
    for y in 0..height {
        border.push((0, y));
        border.push((width.saturating_sub(1), y));
    }
    if width > 0 && height > 0 {
        flood(border, seen.as_mut_slice());
    }

    let mut count = 0;
    for y in 0..height {
        for x in 0..width {
            if seen[index(x, y)] || !is_paper(x, y) {
                continue;
            }
            if flood(vec![(x, y)], seen.as_mut_slice()) >= MIN_ENCLOSED_PIXELS {
                count += 1;
            }
        }
    }
    count
}

/// Deterministic offline stand-in for the model API. Replies are shaped like
/// real model output (fenced JSON with commentary, prose for unknown input)
/// so the whole extraction path is exercised.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunTransport;

impl DryrunTransport {
    pub fn new() -> Self {
        Self
    }

    fn recognize(&self, request: &GenerateRequest) -> GenerateResponse {
        let Some(data) = request.parts.iter().find_map(|part| match part {
            Part::InlineData { data, .. } => Some(data),
            Part::Text(_) => None,
        }) else {
            return GenerateResponse::from_text("I can't see any image in this request.");
        };
        let bitmap = BASE64
            .decode(data.as_bytes())
            .ok()
            .and_then(|bytes| image::load_from_memory(&bytes).ok());
        let Some(bitmap) = bitmap else {
            return GenerateResponse::from_text("I couldn't open the attached image.");
        };
        let enclosed = enclosed_regions(&bitmap.to_luma8());
        let Some(entry) = offline_guess(enclosed).and_then(offline_kanji) else {
            return GenerateResponse::from_text(format!(
                "I can't tell which kanji this is offline ({enclosed} enclosed regions)."
            ));
        };
        let pretty = serde_json::to_string_pretty(&entry.to_json()).unwrap_or_default();
        let mut response = GenerateResponse::from_text(format!(
            "この文字は「{}」だと思います。\n```json\n{pretty}\n```\nGood luck with your studies!",
            entry.character
        ));
        response.warnings.push(format!(
            "dryrun transport guessed {} from {enclosed} enclosed regions",
            entry.character
        ));
        response
    }

    fn lookup(&self, request: &GenerateRequest) -> GenerateResponse {
        let character = request.metadata_str("character").unwrap_or_default();
        match offline_kanji(character) {
            Some(entry) => GenerateResponse::from_text(entry.to_json().to_string()),
            None => GenerateResponse::from_text(format!(
                "Sorry, I don't have offline data for '{character}'."
            )),
        }
    }

    fn chat(&self, request: &GenerateRequest) -> GenerateResponse {
        let message = request.metadata_str("message").unwrap_or_default();
        let reply = match request.metadata_str("language") {
            Some("ja") => format!("（オフライン）「{message}」ですね。日本語の練習を続けましょう！"),
            _ => format!("(offline) You said \"{message}\". Let's keep practising Japanese!"),
        };
        GenerateResponse::from_text(reply)
    }

    fn translate(&self, request: &GenerateRequest) -> GenerateResponse {
        let text = request.metadata_str("text").unwrap_or_default();
        let target = request.metadata_str("target").unwrap_or("en");
        GenerateResponse::from_text(
            json!({
                "translation": format!("[{target}] {text}"),
                "notes": "offline translation",
            })
            .to_string(),
        )
    }

    fn vocabulary(&self, request: &GenerateRequest) -> GenerateResponse {
        let count = request
            .metadata
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(5) as usize;
        let words: Vec<Value> = OFFLINE_KANJI
            .iter()
            .flat_map(|entry| entry.examples.iter())
            .take(count)
            .map(|(word, reading, meaning)| {
                json!({"word": word, "reading": reading, "meaning": meaning})
            })
            .collect();
        GenerateResponse::from_text(format!(
            "```json\n{}\n```",
            json!({ "words": words })
        ))
    }

    fn kanji_image(&self, request: &GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        let character = request.metadata_str("character").unwrap_or_default();
        let (r, g, b) = color_from_prompt(character);
        let image = RgbImage::from_pixel(DRYRUN_IMAGE_SIZE, DRYRUN_IMAGE_SIZE, Rgb([r, g, b]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| PipelineError::Transport(format!("dryrun image encode failed: {err}")))?;
        Ok(GenerateResponse::from_image("image/png", BASE64.encode(bytes)))
    }
}

impl GenerativeTransport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        let mut response = match request.metadata_str("task") {
            Some("recognize") => self.recognize(request),
            Some("lookup") => self.lookup(request),
            Some("chat") => self.chat(request),
            Some("translate") => self.translate(request),
            Some("vocabulary") => self.vocabulary(request),
            Some("kanji_image") => self.kanji_image(request)?,
            other => {
                return Err(PipelineError::Validation(format!(
                    "dryrun transport has no canned reply for task {other:?}"
                )))
            }
        };
        response.model_version = Some(format!("dryrun:{}", request.model));
        Ok(response)
    }
}

pub(crate) fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kotoba_contracts::extract::extract;
    use kotoba_contracts::kanji::validate_expecting;
    use serde_json::{json, Map, Value};

    use std::io::Cursor;

    use base64::Engine as _;
    use image::{GrayImage, ImageFormat, Luma};

    use super::{enclosed_regions, DryrunTransport, BASE64};
    use crate::transport::{
        GenerateRequest, GenerationParams, GenerativeTransport, Part, ResponseModality,
    };

    /// White 128px square with 8px-thick ink bars at the given rows and columns,
    /// each spanning `from..to` of the other axis.
    fn glyph(rows: &[u32], cols: &[u32], from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(128, 128, |x, y| {
            let on_row = rows.iter().any(|row| (*row..row + 8).contains(&y)) && (from..to).contains(&x);
            let on_col = cols.iter().any(|col| (*col..col + 8).contains(&x)) && (from..to).contains(&y);
            if on_row || on_col {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn hi() -> GrayImage {
        glyph(&[20, 60, 100], &[30, 90], 20, 108)
    }

    fn kuchi() -> GrayImage {
        glyph(&[20, 100], &[20, 100], 20, 108)
    }

    fn ichi() -> GrayImage {
        glyph(&[60], &[], 20, 108)
    }

    fn png_part(image: &GrayImage) -> Part {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        Part::inline("image/png", BASE64.encode(bytes))
    }

    fn recognize(image: &GrayImage) -> String {
        DryrunTransport::new()
            .generate(&request(
                json!({"task": "recognize"}),
                vec![Part::text("which kanji?"), png_part(image)],
            ))
            .unwrap()
            .text()
    }

    fn request(metadata: Value, parts: Vec<Part>) -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.5-flash".to_string(),
            parts,
            params: GenerationParams::new(0.4, 0.95, 40, 1024),
            modality: ResponseModality::Text,
            timeout: Duration::from_secs(5),
            api_key: None,
            metadata: metadata.as_object().cloned().unwrap_or_else(Map::new),
        }
    }

    #[test]
    fn lookup_of_known_kanji_validates() {
        let response = DryrunTransport::new()
            .generate(&request(
                json!({"task": "lookup", "character": "山"}),
                vec![Part::text("look up 山")],
            ))
            .unwrap();
        let value = extract(&response.text()).unwrap();
        let record = validate_expecting(&value, Some('山')).unwrap();
        assert_eq!(record.stroke_count, 3);
    }

    #[test]
    fn counters_are_counted() {
        assert_eq!(enclosed_regions(&hi()), 2);
        assert_eq!(enclosed_regions(&kuchi()), 1);
        assert_eq!(enclosed_regions(&ichi()), 0);
        assert_eq!(enclosed_regions(&GrayImage::new(0, 0)), 0);
    }

    #[test]
    fn recognition_depends_on_the_drawing() {
        let hi = validate_expecting(&extract(&recognize(&hi())).unwrap(), Some('日')).unwrap();
        assert_eq!(hi.stroke_count, 4);
        let kuchi =
            validate_expecting(&extract(&recognize(&kuchi())).unwrap(), Some('口')).unwrap();
        assert_eq!(kuchi.stroke_count, 3);
        assert!(extract(&recognize(&ichi())).is_err());
    }

    #[test]
    fn undecodable_image_gets_prose() {
        let response = DryrunTransport::new()
            .generate(&request(
                json!({"task": "recognize"}),
                vec![Part::inline("image/png", "iVBORw0KGgo=")],
            ))
            .unwrap();
        assert!(extract(&response.text()).is_err());
    }

    #[test]
    fn unknown_kanji_gets_prose() {
        let response = DryrunTransport::new()
            .generate(&request(json!({"task": "lookup", "character": "鬱"}), vec![]))
            .unwrap();
        assert!(extract(&response.text()).is_err());
    }

    #[test]
    fn kanji_image_is_a_png_that_depends_on_character() {
        let transport = DryrunTransport::new();
        let first = transport
            .generate(&request(json!({"task": "kanji_image", "character": "日"}), vec![]))
            .unwrap();
        let second = transport
            .generate(&request(json!({"task": "kanji_image", "character": "月"}), vec![]))
            .unwrap();
        let (mime, data) = first.first_image().unwrap();
        assert_eq!(mime, "image/png");
        assert_ne!(Some(data), second.first_image().map(|(_, data)| data));
    }

    #[test]
    fn unknown_task_is_rejected() {
        assert!(DryrunTransport::new()
            .generate(&request(json!({}), vec![]))
            .is_err());
    }
}
