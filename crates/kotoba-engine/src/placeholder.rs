use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use kotoba_contracts::api::{encode_data_url, KanjiImage};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::transport::color_from_prompt;

pub const PLACEHOLDER_MIME: &str = "image/png";
const CARD_SIZE: u32 = 256;
const FRAME: u32 = 8;
const GRID_CELLS: u32 = 5;
const GRID_CELL: u32 = 24;

/// Card shown when no model produced an image: a practice-paper square on a
/// tinted background with a mirrored block stamp in the middle. Tint and stamp
/// are stable per character.
pub fn placeholder_card(character: char) -> RgbImage {
    let key = character.to_string();
    let (r, g, b) = color_from_prompt(&key);
    let background = Rgb([lighten(r), lighten(g), lighten(b)]);
    let ink = Rgb([r / 3, g / 3, b / 3]);
    let guide = Rgb([
        blend(background.0[0], ink.0[0]),
        blend(background.0[1], ink.0[1]),
        blend(background.0[2], ink.0[2]),
    ]);
    let stamp = stamp_bits(&key);

    let grid = GRID_CELLS * GRID_CELL;
    let grid_start = (CARD_SIZE - grid) / 2;
    let half = CARD_SIZE / 2;
    RgbImage::from_fn(CARD_SIZE, CARD_SIZE, |x, y| {
        let edge = x.min(y).min(CARD_SIZE - 1 - x).min(CARD_SIZE - 1 - y);
        if edge < FRAME {
            return ink;
        }
        let in_grid = (grid_start..grid_start + grid).contains(&x)
            && (grid_start..grid_start + grid).contains(&y);
        if in_grid {
            let col = ((x - grid_start) / GRID_CELL) as usize;
            let row = ((y - grid_start) / GRID_CELL) as usize;
            if stamp[row][col] {
                return ink;
            }
        }
        // dashed centre guides
        let on_guide = (x == half || y == half) && (x + y) % 8 < 4;
        if on_guide {
            guide
        } else {
            background
        }
    })
}

pub fn placeholder_image(character: char) -> Result<KanjiImage, PipelineError> {
    let mut bytes = Vec::new();
    placeholder_card(character)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| PipelineError::Transport(format!("placeholder encode failed: {err}")))?;
    Ok(KanjiImage {
        character: character.to_string(),
        data_url: encode_data_url(PLACEHOLDER_MIME, &bytes),
        mime_type: PLACEHOLDER_MIME.to_string(),
        model: None,
        placeholder: true,
    })
}

/// Left-right mirrored 5x5 pattern from the character's digest.
fn stamp_bits(key: &str) -> [[bool; GRID_CELLS as usize]; GRID_CELLS as usize] {
    let digest = Sha256::digest(format!("stamp:{key}").as_bytes());
    let mut bits = [[false; GRID_CELLS as usize]; GRID_CELLS as usize];
    for (row, cells) in bits.iter_mut().enumerate() {
        for col in 0..3 {
            let on = digest[row * 3 + col] & 1 == 1;
            cells[col] = on;
            cells[GRID_CELLS as usize - 1 - col] = on;
        }
    }
    bits
}

fn lighten(channel: u8) -> u8 {
    // halfway to white
    channel / 2 + 128
}

fn blend(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16) / 2) as u8
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;
    use kotoba_contracts::api::parse_image_data_url;

    use super::{placeholder_card, placeholder_image, CARD_SIZE, PLACEHOLDER_MIME};

    #[test]
    fn card_is_deterministic_per_character() {
        let card = placeholder_card('日');
        assert_eq!(card.dimensions(), (CARD_SIZE, CARD_SIZE));
        assert_eq!(card, placeholder_card('日'));
        assert_ne!(card, placeholder_card('月'));
    }

    #[test]
    fn placeholder_is_a_png_data_url() -> anyhow::Result<()> {
        let image = placeholder_image('木')?;
        assert!(image.placeholder);
        assert_eq!(image.character, "木");
        assert_eq!(image.mime_type, PLACEHOLDER_MIME);

        let parsed = parse_image_data_url(&image.data_url)?;
        assert_eq!(parsed.mime_type, "image/png");
        let decoded = image::load_from_memory_with_format(&parsed.bytes, ImageFormat::Png)?;
        assert_eq!(decoded.to_rgb8(), placeholder_card('木'));
        Ok(())
    }
}
