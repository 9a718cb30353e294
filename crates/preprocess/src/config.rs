use std::str::FromStr;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// How the upright frame is fitted into the model's fixed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Uniform scale, centered on a gray canvas.
    #[default]
    Letterbox,
    /// Independent per-axis scale filling the whole input.
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, 3, H, W]`
    #[default]
    Nchw,
    /// `[1, H, W, 3]`
    Nhwc,
}

/// Value mapping applied to float inputs. Quantized inputs keep raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Normalization {
    #[default]
    ZeroToOne,
    MinusOneToOne,
    ImageNet,
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl Normalization {
    #[inline]
    pub fn apply(&self, channel: usize, value: u8) -> f32 {
        let v = value as f32 / 255.0;
        match self {
            Normalization::ZeroToOne => v,
            Normalization::MinusOneToOne => v * 2.0 - 1.0,
            Normalization::ImageNet => (v - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorType {
    #[default]
    Float32,
    UInt8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    pub input_size: (u32, u32),
    pub resize_mode: ResizeMode,
    pub layout: TensorLayout,
    pub normalization: Normalization,
    pub tensor_type: TensorType,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            resize_mode: ResizeMode::default(),
            layout: TensorLayout::default(),
            normalization: Normalization::default(),
            tensor_type: TensorType::default(),
        }
    }
}

impl PreprocessConfig {
    pub fn with_input_size(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            ..Self::default()
        }
    }
}

impl FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "letterbox" => Ok(ResizeMode::Letterbox),
            "stretch" => Ok(ResizeMode::Stretch),
            other => Err(format!("unknown resize mode '{}'", other)),
        }
    }
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nchw" => Ok(TensorLayout::Nchw),
            "nhwc" => Ok(TensorLayout::Nhwc),
            other => Err(format!("unknown tensor layout '{}'", other)),
        }
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zero_to_one" | "unit" => Ok(Normalization::ZeroToOne),
            "minus_one_to_one" | "signed" => Ok(Normalization::MinusOneToOne),
            "imagenet" => Ok(Normalization::ImageNet),
            other => Err(format!("unknown normalization '{}'", other)),
        }
    }
}
