use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CanvasError;

/// Points closer than this to the previous recorded point are dropped.
pub const DEFAULT_MIN_POINT_DISTANCE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &StrokePoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &StrokePoint) -> StrokePoint {
        StrokePoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// One pointer-down-to-up path. Never mutated after it is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<StrokePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
}

/// Pointer event as a browser canvas reports it (`{"pointerId", "kind", "x", "y"}`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn new(pointer_id: u32, kind: PointerKind, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            kind,
            x,
            y,
        }
    }

    fn point(&self) -> StrokePoint {
        StrokePoint::new(self.x, self.y)
    }
}

#[derive(Debug, Clone)]
struct ActiveStroke {
    pointer_id: u32,
    points: Vec<StrokePoint>,
}

/// Snapshot handed out by [`DrawingSession::begin_submission`]; drawing may
/// continue while it is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub strokes: Vec<Stroke>,
}

/// Collects strokes from pointer events for a single drawing.
///
/// A stroke captures its pointer exclusively: events from any other pointer id
/// are ignored until the capturing pointer goes up or leaves the surface.
#[derive(Debug, Clone)]
pub struct DrawingSession {
    strokes: Vec<Stroke>,
    active: Option<ActiveStroke>,
    min_point_distance: f32,
    submitting: bool,
}

impl Default for DrawingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingSession {
    pub fn new() -> Self {
        Self::with_min_point_distance(DEFAULT_MIN_POINT_DISTANCE)
    }

    pub fn with_min_point_distance(min_point_distance: f32) -> Self {
        Self {
            strokes: Vec::new(),
            active: None,
            min_point_distance: min_point_distance.max(0.0),
            submitting: false,
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.active.is_none()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Returns `true` when the event changed the session.
    pub fn handle(&mut self, event: PointerEvent) -> bool {
        match event.kind {
            PointerKind::Down => self.pointer_down(event),
            PointerKind::Move => self.pointer_move(event),
            PointerKind::Up | PointerKind::Leave => self.pointer_release(event),
        }
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.active = None;
    }

    pub fn begin_submission(&mut self) -> Result<Submission, CanvasError> {
        if self.submitting {
            return Err(CanvasError::SubmissionInFlight);
        }
        if self.strokes.is_empty() {
            return Err(CanvasError::NoDrawing);
        }
        self.submitting = true;
        debug!(strokes = self.strokes.len(), "drawing submitted");
        Ok(Submission {
            strokes: self.strokes.clone(),
        })
    }

    /// Ends the in-flight submission. A successful one consumes the submitted
    /// strokes (anything drawn meanwhile is kept); a failed one leaves the
    /// drawing in place for another try.
    pub fn complete_submission(&mut self, submission: Submission, success: bool) {
        self.submitting = false;
        if success {
            let submitted = submission.strokes.len().min(self.strokes.len());
            self.strokes.drain(..submitted);
        }
    }

    fn pointer_down(&mut self, event: PointerEvent) -> bool {
        if let Some(active) = &self.active {
            if active.pointer_id != event.pointer_id {
                return false;
            }
            self.finish_active();
        }
        self.active = Some(ActiveStroke {
            pointer_id: event.pointer_id,
            points: vec![event.point()],
        });
        true
    }

    fn pointer_move(&mut self, event: PointerEvent) -> bool {
        let min_distance = self.min_point_distance;
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.pointer_id != event.pointer_id {
            return false;
        }
        let point = event.point();
        match active.points.last() {
            Some(last) if last.distance(&point) <= min_distance => false,
            _ => {
                active.points.push(point);
                true
            }
        }
    }

    fn pointer_release(&mut self, event: PointerEvent) -> bool {
        match &self.active {
            Some(active) if active.pointer_id == event.pointer_id => {}
            _ => return false,
        }
        self.pointer_move(PointerEvent {
            kind: PointerKind::Move,
            ..event
        });
        self.finish_active();
        true
    }

    fn finish_active(&mut self) {
        if let Some(active) = self.active.take() {
            self.strokes.push(Stroke {
                points: active.points,
            });
        }
    }
}
