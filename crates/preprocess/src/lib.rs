pub mod config;
pub mod cpu;
pub mod error;
pub mod frame;
pub mod tensor;
pub mod transform;

pub use config::{
    DEFAULT_INPUT_SIZE, Normalization, PreprocessConfig, ResizeMode, TensorLayout, TensorType,
};
pub use cpu::CpuPreProcessor;
pub use error::PreprocessError;
pub use frame::{Frame, PixelFormat, Rotation};
pub use tensor::InputTensor;
pub use transform::FrameTransform;

/// Result of preprocessing including transformation parameters
#[derive(Debug)]
pub struct PreprocessResult {
    /// Tensor ready for the inference engine
    pub tensor: InputTensor,
    /// Everything needed to map model-space boxes back onto the frame
    pub transform: FrameTransform,
}
