pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod processing;
pub mod service;
pub mod source;
pub mod types;

// Re-export commonly used types for convenience
pub use backend::{InferenceEngine, ModelSettings, OutputSpec, RawOutput};
pub use channel::{FrameReceiver, FrameSender, ReceivedFrame, frame_channel};
pub use config::InferenceConfig;
pub use error::DetectionError;
pub use overlay::{OverlayPublisher, OverlayReceiver, OverlaySink, overlay_channel};
pub use pipeline::{DetectionPipeline, PipelineConfig, PipelineState};
pub use processing::{CoordinateMapper, CoordinateSpace, DecoderConfig, DetectionDecoder, RawDetection};
pub use service::{DetectionService, ServiceStats};
pub use types::BoundingBox;
