pub mod decode;
pub mod mapping;

pub use decode::{DecoderConfig, DetectionDecoder, RawDetection};
pub use mapping::{CoordinateMapper, CoordinateSpace};
