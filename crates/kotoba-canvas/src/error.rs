use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("nothing has been drawn")]
    NoDrawing,
    #[error("drawing has no extent (bounding box is a single point)")]
    DegenerateDrawing,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("failed to encode bitmap: {0}")]
    Encode(#[from] image::ImageError),
}
