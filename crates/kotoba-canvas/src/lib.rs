//! Freehand stroke capture and normalization into a recognition-ready bitmap.

mod error;
mod normalize;
mod session;
mod smoothing;

pub use error::CanvasError;
pub use normalize::{
    normalize, occupied_bounds, scale_factor, BoundingBox, NormalizeOptions, NormalizedBitmap,
    FILL_RATIO, MAX_SCALE, MIN_SCALE, STROKE_WIDTH, TARGET_SIZE, THRESHOLD,
};
pub use session::{
    DrawingSession, PointerEvent, PointerKind, Stroke, StrokePoint, Submission,
    DEFAULT_MIN_POINT_DISTANCE,
};
pub use smoothing::{smooth_stroke, CURVE_SEGMENTS};
