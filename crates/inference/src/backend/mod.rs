use crate::error::DetectionError;
use ndarray::{ArrayD, ArrayView2, Axis, Ix3};
use preprocess::InputTensor;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Number of geometry values (cx, cy, w, h) leading every candidate row.
pub const BOX_ATTRIBUTES: usize = 4;

pub trait InferenceEngine {
    /// Load the model artifact. Called once, at pipeline construction.
    fn load_model(settings: &ModelSettings) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn is_ready(&self) -> bool {
        true
    }

    /// Run a single batch-1 inference.
    fn run(&mut self, input: &InputTensor) -> Result<RawOutput, DetectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            other => Err(format!("unknown execution provider '{}'", other)),
        }
    }
}

/// Where and how to load the model artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model_path: String,
    pub input_name: String,
    pub output_name: String,
    pub provider: ExecutionProvider,
    pub intra_threads: usize,
}

/// Axis order of the single detection output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// `[1, N, 4 + C]`
    Rows,
    /// `[1, 4 + C, N]`, the usual anchor-free YOLO export
    #[default]
    Attributes,
}

impl FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rows" | "rows_major" => Ok(OutputLayout::Rows),
            "attributes" | "attributes_major" | "channels_first" => Ok(OutputLayout::Attributes),
            other => Err(format!("unknown output layout '{}'", other)),
        }
    }
}

/// Unit of the box geometry in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxUnits {
    /// Model input pixels.
    #[default]
    Pixels,
    /// Fractions of the model input size.
    Normalized,
}

impl FromStr for BoxUnits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pixels" | "px" => Ok(BoxUnits::Pixels),
            "normalized" => Ok(BoxUnits::Normalized),
            other => Err(format!("unknown box units '{}'", other)),
        }
    }
}

/// Transform turning a raw class value into a confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreActivation {
    #[default]
    Identity,
    Sigmoid,
}

impl ScoreActivation {
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            ScoreActivation::Identity => x,
            ScoreActivation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

impl FromStr for ScoreActivation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" | "none" => Ok(ScoreActivation::Identity),
            "sigmoid" => Ok(ScoreActivation::Sigmoid),
            other => Err(format!("unknown score activation '{}'", other)),
        }
    }
}

/// The model's declared output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub layout: OutputLayout,
    pub num_classes: usize,
    pub box_units: BoxUnits,
    pub activation: ScoreActivation,
}

impl OutputSpec {
    pub fn attributes(&self) -> usize {
        BOX_ATTRIBUTES + self.num_classes
    }
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            layout: OutputLayout::default(),
            num_classes: 1,
            box_units: BoxUnits::default(),
            activation: ScoreActivation::default(),
        }
    }
}

/// Raw detection tensor as produced by the engine.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub data: ArrayD<f32>,
}

impl RawOutput {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Check the shape against `spec` and return a `[N, 4 + C]` view.
    pub fn candidates(&self, spec: &OutputSpec) -> Result<ArrayView2<'_, f32>, DetectionError> {
        let shape = self.data.shape();
        let expected = spec.attributes();
        let attr_axis = match spec.layout {
            OutputLayout::Rows => 2,
            OutputLayout::Attributes => 1,
        };

        if shape.len() != 3 || shape[0] != 1 || shape[attr_axis] != expected {
            let want = match spec.layout {
                OutputLayout::Rows => format!("[1, N, {}]", expected),
                OutputLayout::Attributes => format!("[1, {}, N]", expected),
            };
            return Err(DetectionError::inference(format!(
                "output shape mismatch: expected {}, got {:?}",
                want, shape
            )));
        }

        let batch = self
            .data
            .view()
            .into_dimensionality::<Ix3>()?
            .index_axis_move(Axis(0), 0);

        Ok(match spec.layout {
            OutputLayout::Rows => batch,
            OutputLayout::Attributes => batch.reversed_axes(),
        })
    }
}
