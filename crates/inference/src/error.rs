use preprocess::PreprocessError;
use thiserror::Error;

/// Failures surfaced by [`crate::DetectionPipeline::process`].
#[derive(Error, Debug)]
pub enum DetectionError {
    /// No engine attached yet, or the engine reports it cannot run.
    #[error("Inference engine is not ready")]
    EngineNotReady,

    /// Output shape mismatch or backend failure for a single frame.
    #[error("Model inference failed: {0}")]
    ModelInference(String),

    #[error("Pipeline is closed")]
    PipelineClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl DetectionError {
    /// Whether the failure only concerns the current frame.
    ///
    /// Frame-local failures leave the pipeline usable; the others need the
    /// caller to initialize or stop feeding the pipeline.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            DetectionError::ModelInference(_) | DetectionError::InvalidFrame(_)
        )
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        DetectionError::ModelInference(msg.into())
    }
}

impl From<PreprocessError> for DetectionError {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::InvalidFrame(msg) => DetectionError::InvalidFrame(msg),
            other => DetectionError::InvalidFrame(other.to_string()),
        }
    }
}

impl From<ndarray::ShapeError> for DetectionError {
    fn from(err: ndarray::ShapeError) -> Self {
        DetectionError::ModelInference(err.to_string())
    }
}

#[cfg(feature = "ort-backend")]
impl From<ort::Error> for DetectionError {
    fn from(err: ort::Error) -> Self {
        DetectionError::ModelInference(err.to_string())
    }
}
