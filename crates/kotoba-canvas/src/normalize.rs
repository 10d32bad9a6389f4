use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use tracing::debug;

use crate::error::CanvasError;
use crate::session::{Stroke, StrokePoint};
use crate::smoothing::smooth_stroke;

pub const TARGET_SIZE: u32 = 512;
pub const FILL_RATIO: f32 = 0.7;
pub const MIN_SCALE: f32 = 1.0;
pub const MAX_SCALE: f32 = 10.0;
pub const STROKE_WIDTH: f32 = 24.0;
pub const THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    pub target_size: u32,
    pub fill_ratio: f32,
    pub stroke_width: f32,
    pub threshold: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            target_size: TARGET_SIZE,
            fill_ratio: FILL_RATIO,
            stroke_width: STROKE_WIDTH,
            threshold: THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn of_strokes(strokes: &[Stroke]) -> Option<Self> {
        let mut points = strokes.iter().flat_map(|stroke| stroke.points.iter());
        let first = points.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for point in points {
            bbox.min_x = bbox.min_x.min(point.x);
            bbox.min_y = bbox.min_y.min(point.y);
            bbox.max_x = bbox.max_x.max(point.x);
            bbox.max_y = bbox.max_y.max(point.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn longer_side(&self) -> f32 {
        self.width().max(self.height())
    }

    pub fn center(&self) -> StrokePoint {
        StrokePoint::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Uniform scale mapping the longer side of `bbox` to `fill_ratio` of the
/// target, clamped to `[MIN_SCALE, MAX_SCALE]`.
pub fn scale_factor(bbox: &BoundingBox, options: &NormalizeOptions) -> f32 {
    let longer = bbox.longer_side();
    if longer.is_nan() || longer <= 0.0 {
        return MAX_SCALE;
    }
    let raw = options.target_size as f32 * options.fill_ratio / longer;
    raw.clamp(MIN_SCALE, MAX_SCALE)
}

/// Binary black-on-white bitmap ready for recognition.
#[derive(Debug, Clone)]
pub struct NormalizedBitmap {
    pub image: RgbImage,
    pub bbox: BoundingBox,
    pub scale: f32,
}

impl NormalizedBitmap {
    pub fn to_png(&self) -> Result<Vec<u8>, CanvasError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    pub fn to_data_url(&self) -> Result<String, CanvasError> {
        let png = self.to_png()?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }
}

/// Centres and scales the drawing into a fixed-size canvas, redraws it with a
/// heavy pen on white and hard-thresholds every channel.
pub fn normalize(
    strokes: &[Stroke],
    options: &NormalizeOptions,
) -> Result<NormalizedBitmap, CanvasError> {
    let bbox = BoundingBox::of_strokes(strokes).ok_or(CanvasError::NoDrawing)?;
    if bbox.width() <= 0.0 && bbox.height() <= 0.0 {
        return Err(CanvasError::DegenerateDrawing);
    }
    let scale = scale_factor(&bbox, options);
    let center = bbox.center();
    let half = options.target_size as f32 / 2.0;
    let transform = |point: &StrokePoint| {
        StrokePoint::new(
            (point.x - center.x) * scale + half,
            (point.y - center.y) * scale + half,
        )
    };

    let mut image = RgbImage::from_pixel(
        options.target_size,
        options.target_size,
        Rgb([255, 255, 255]),
    );
    let radius = options.stroke_width / 2.0;
    for stroke in strokes {
        let placed: Vec<StrokePoint> = stroke.points.iter().map(transform).collect();
        let path = smooth_stroke(&placed);
        match path.as_slice() {
            [] => {}
            [only] => stamp_circle(&mut image, *only, radius),
            _ => {
                for pair in path.windows(2) {
                    draw_segment(&mut image, pair[0], pair[1], radius);
                }
            }
        }
    }
    apply_threshold(&mut image, options.threshold);
    debug!(
        strokes = strokes.len(),
        scale,
        width = bbox.width(),
        height = bbox.height(),
        "drawing normalized"
    );

    Ok(NormalizedBitmap { image, bbox, scale })
}

/// Pixel bounds `(min_x, min_y, max_x, max_y)` of every non-white pixel.
pub fn occupied_bounds(image: &RgbImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0.iter().all(|channel| *channel == 255) {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
        });
    }
    bounds
}

fn draw_segment(image: &mut RgbImage, start: StrokePoint, end: StrokePoint, radius: f32) {
    let distance = start.distance(&end);
    if distance < 0.1 {
        stamp_circle(image, start, radius);
        return;
    }
    let steps = distance.ceil() as usize;
    for idx in 0..=steps {
        let t = idx as f32 / steps as f32;
        let point = StrokePoint::new(
            start.x + (end.x - start.x) * t,
            start.y + (end.y - start.y) * t,
        );
        stamp_circle(image, point, radius);
    }
}

/// Darkens pixels covered by a soft-edged disc; coverage ramps over one pixel.
fn stamp_circle(image: &mut RgbImage, center: StrokePoint, radius: f32) {
    let (width, height) = image.dimensions();
    let reach = radius + 1.0;
    let min_x = (center.x - reach).floor().max(0.0) as u32;
    let min_y = (center.y - reach).floor().max(0.0) as u32;
    let max_x = (center.x + reach).ceil().min(width as f32 - 1.0);
    let max_y = (center.y + reach).ceil().min(height as f32 - 1.0);
    if max_x < 0.0 || max_y < 0.0 {
        return;
    }
    let (max_x, max_y) = (max_x as u32, max_y as u32);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let pixel_center = StrokePoint::new(x as f32 + 0.5, y as f32 + 0.5);
            let coverage = (radius + 0.5 - pixel_center.distance(&center)).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let ink = (255.0 * (1.0 - coverage)).round() as u8;
            let pixel = image.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel).min(ink);
            }
        }
    }
}

fn apply_threshold(image: &mut RgbImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = if *channel < threshold { 0 } else { 255 };
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::session::{Stroke, StrokePoint};

    fn line(from: (f32, f32), to: (f32, f32)) -> Stroke {
        Stroke {
            points: vec![StrokePoint::new(from.0, from.1), StrokePoint::new(to.0, to.1)],
        }
    }

    #[test]
    fn empty_drawing_is_rejected() {
        assert!(matches!(
            normalize(&[], &NormalizeOptions::default()),
            Err(CanvasError::NoDrawing)
        ));
    }

    #[test]
    fn single_dot_is_degenerate() {
        let dot = Stroke {
            points: vec![StrokePoint::new(40.0, 40.0)],
        };
        assert!(matches!(
            normalize(&[dot], &NormalizeOptions::default()),
            Err(CanvasError::DegenerateDrawing)
        ));
    }

    #[test]
    fn horizontal_stroke_is_not_degenerate() {
        let bitmap = normalize(&[line((10.0, 50.0), (110.0, 50.0))], &NormalizeOptions::default())
            .unwrap();
        assert!(occupied_bounds(&bitmap.image).is_some());
    }

    #[test]
    fn longer_side_fills_seventy_percent_plus_pen_width() {
        let options = NormalizeOptions::default();
        let strokes = vec![
            line((100.0, 100.0), (300.0, 100.0)),
            line((200.0, 60.0), (200.0, 160.0)),
        ];
        let bitmap = normalize(&strokes, &options).unwrap();
        let (min_x, min_y, max_x, max_y) = occupied_bounds(&bitmap.image).unwrap();
        let occupied_width = (max_x - min_x + 1) as f32;
        let expected = options.target_size as f32 * options.fill_ratio + options.stroke_width;
        assert!(
            (occupied_width - expected).abs() <= 3.0,
            "occupied width {occupied_width}, expected {expected}"
        );
        // centred on the target
        let center_x = (min_x + max_x) as f32 / 2.0;
        let center_y = (min_y + max_y) as f32 / 2.0;
        assert!((center_x - 256.0).abs() <= 2.0);
        assert!((center_y - 256.0).abs() <= 2.0);
    }

    #[test]
    fn output_is_strictly_black_and_white() {
        let bitmap = normalize(&[line((0.0, 0.0), (37.0, 91.0))], &NormalizeOptions::default())
            .unwrap();
        assert!(bitmap
            .image
            .pixels()
            .all(|pixel| pixel.0.iter().all(|channel| *channel == 0 || *channel == 255)));
    }

    #[test]
    fn data_url_is_png() -> anyhow::Result<()> {
        let bitmap = normalize(&[line((0.0, 0.0), (50.0, 50.0))], &NormalizeOptions::default())?;
        let url = bitmap.to_data_url()?;
        let encoded = url.strip_prefix("data:image/png;base64,").unwrap_or_default();
        let bytes = STANDARD.decode(encoded)?;
        assert_eq!(&bytes[..4], b"\x89PNG");
        Ok(())
    }

    proptest! {
        #[test]
        fn scale_stays_within_bounds(width in 0.5f32..5000.0, height in 0.0f32..5000.0) {
            let bbox = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: width, max_y: height };
            let scale = scale_factor(&bbox, &NormalizeOptions::default());
            prop_assert!((MIN_SCALE..=MAX_SCALE).contains(&scale));
        }

        #[test]
        fn unclamped_scale_maps_longer_side_to_fill_ratio(longer in 35.9f32..358.0) {
            let bbox = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: longer, max_y: longer / 2.0 };
            let scale = scale_factor(&bbox, &NormalizeOptions::default());
            prop_assert!((longer * scale - TARGET_SIZE as f32 * FILL_RATIO).abs() < 0.01);
        }
    }
}
