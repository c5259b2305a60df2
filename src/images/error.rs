use thiserror::Error;

/// Failure taxonomy of the image pipeline. Callers branch on the variant:
/// validation failures are permanent, fetch failures become eligible again on
/// the next migration run, storage upload failures mean no URL may be
/// persisted, and generation failures must not leave partial records.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to fetch source image: {0}")]
    Fetch(String),
    #[error("invalid image payload: {0}")]
    Validation(String),
    #[error("object storage rejected the request: {0}")]
    Storage(String),
    #[error("image generation produced no usable output: {0}")]
    Generation(String),
}

impl ImageError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ImageError::Validation(_))
    }
}
