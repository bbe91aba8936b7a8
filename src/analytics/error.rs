use thiserror::Error;

/// `(rows, cols, channels)` of an image.
pub type Shape = (i32, i32, i32);

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("image shapes differ: reference {reference:?}, current {current:?}")]
    DimensionMismatch { reference: Shape, current: Shape },
    #[error("no reference image has been captured")]
    NoReference,
    #[error("no frame available: {0}")]
    NoFrame(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}
