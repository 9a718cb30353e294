use crate::backend::{ExecutionProvider, ModelSettings, OutputSpec};
use crate::pipeline::PipelineConfig;
use crate::processing::{CoordinateSpace, DecoderConfig};
use common::{env_optional, env_parse, env_string};
use preprocess::{PreprocessConfig, Rotation, TensorType};
use std::path::PathBuf;

pub use common::Environment;

/// Class ids are carried as `u16`.
const MAX_CLASSES: usize = u16::MAX as usize + 1;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub model: ModelSettings,
    pub preprocess: PreprocessConfig,
    pub decoder: DecoderConfig,
    pub coordinate_space: CoordinateSpace,
    pub labels: Vec<String>,
    /// Directory of still images replayed as a camera feed.
    pub frame_dir: Option<PathBuf>,
    pub frame_interval_ms: u64,
    pub frame_rotation: Rotation,
    pub otel_endpoint: Option<String>,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let model = ModelSettings {
            model_path: env_string("MODEL_PATH", "models/plate_detector.onnx"),
            input_name: env_string("INPUT_NAME", "images"),
            output_name: env_string("OUTPUT_NAME", "output0"),
            provider: env_parse("EXECUTION_PROVIDER", ExecutionProvider::Cpu)?,
            intra_threads: env_parse("INTRA_THREADS", 4)?,
        };

        let defaults = PreprocessConfig::default();
        let tensor_type = if env_parse("QUANTIZED_INPUT", false)? {
            TensorType::UInt8
        } else {
            TensorType::Float32
        };
        let preprocess = PreprocessConfig {
            input_size: (
                env_parse("INPUT_WIDTH", defaults.input_size.0)?,
                env_parse("INPUT_HEIGHT", defaults.input_size.1)?,
            ),
            resize_mode: env_parse("RESIZE_MODE", defaults.resize_mode)?,
            layout: env_parse("TENSOR_LAYOUT", defaults.layout)?,
            normalization: env_parse("NORMALIZATION", defaults.normalization)?,
            tensor_type,
        };

        let default_decoder = DecoderConfig::default();
        let default_output = OutputSpec::default();
        let decoder = DecoderConfig {
            score_threshold: env_parse("SCORE_THRESHOLD", default_decoder.score_threshold)?,
            iou_threshold: env_parse("IOU_THRESHOLD", default_decoder.iou_threshold)?,
            max_detections: env_parse("MAX_DETECTIONS", default_decoder.max_detections)?,
            class_agnostic: env_parse("CLASS_AGNOSTIC_NMS", default_decoder.class_agnostic)?,
            output: OutputSpec {
                layout: env_parse("OUTPUT_LAYOUT", default_output.layout)?,
                num_classes: env_parse("NUM_CLASSES", default_output.num_classes)?,
                box_units: env_parse("BOX_UNITS", default_output.box_units)?,
                activation: env_parse("SCORE_ACTIVATION", default_output.activation)?,
            },
        };

        let labels = env_string("CLASS_LABELS", "license_plate")
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(String::from)
            .collect();

        let rotation_degrees: u32 = env_parse("FRAME_ROTATION", 0)?;
        let frame_rotation = Rotation::try_from(rotation_degrees)?;

        let config = Self {
            environment,
            model,
            preprocess,
            decoder,
            coordinate_space: env_parse("COORDINATE_SPACE", CoordinateSpace::Display)?,
            labels,
            frame_dir: env_optional("FRAME_DIR").map(PathBuf::from),
            frame_interval_ms: env_parse("FRAME_INTERVAL_MS", 33)?,
            frame_rotation,
            otel_endpoint: env_optional("OTEL_ENDPOINT"),
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let (w, h) = self.preprocess.input_size;
        if w == 0 || h == 0 {
            anyhow::bail!("INPUT_WIDTH and INPUT_HEIGHT must be positive, got {}x{}", w, h);
        }
        if !(0.0..=1.0).contains(&self.decoder.score_threshold) {
            anyhow::bail!(
                "SCORE_THRESHOLD must be within [0, 1], got {}",
                self.decoder.score_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.decoder.iou_threshold) {
            anyhow::bail!(
                "IOU_THRESHOLD must be within [0, 1], got {}",
                self.decoder.iou_threshold
            );
        }
        if self.decoder.max_detections == 0 {
            anyhow::bail!("MAX_DETECTIONS must be positive");
        }
        if self.decoder.output.num_classes == 0 {
            anyhow::bail!("NUM_CLASSES must be positive");
        }
        if self.decoder.output.num_classes > MAX_CLASSES {
            anyhow::bail!(
                "NUM_CLASSES must be at most {}, got {}",
                MAX_CLASSES,
                self.decoder.output.num_classes
            );
        }
        if self.labels.len() > self.decoder.output.num_classes {
            anyhow::bail!(
                "CLASS_LABELS has {} labels but NUM_CLASSES is {}",
                self.labels.len(),
                self.decoder.output.num_classes
            );
        }
        if self.model.intra_threads == 0 {
            anyhow::bail!("INTRA_THREADS must be positive");
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            preprocess: self.preprocess.clone(),
            decoder: self.decoder.clone(),
            coordinate_space: self.coordinate_space,
            labels: self.labels.clone(),
        }
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            model: ModelSettings {
                model_path: "/models/model.onnx".to_string(),
                input_name: "images".to_string(),
                output_name: "output0".to_string(),
                provider: ExecutionProvider::Cpu,
                intra_threads: 4,
            },
            preprocess: PreprocessConfig::default(),
            decoder: DecoderConfig::default(),
            coordinate_space: CoordinateSpace::Display,
            labels: vec!["license_plate".to_string()],
            frame_dir: None,
            frame_interval_ms: 33,
            frame_rotation: Rotation::Deg0,
            otel_endpoint: None,
        }
    }
}
