use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Tensor layout error: {0}")]
    Tensor(String),
}

impl PreprocessError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PreprocessError::InvalidFrame(msg.into())
    }
}

impl From<fast_image_resize::ResizeError> for PreprocessError {
    fn from(err: fast_image_resize::ResizeError) -> Self {
        PreprocessError::Resize(err.to_string())
    }
}

impl From<fast_image_resize::ImageBufferError> for PreprocessError {
    fn from(err: fast_image_resize::ImageBufferError) -> Self {
        PreprocessError::Resize(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PreprocessError {
    fn from(err: ndarray::ShapeError) -> Self {
        PreprocessError::Tensor(err.to_string())
    }
}
