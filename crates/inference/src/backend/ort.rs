use super::{ExecutionProvider, InferenceEngine, ModelSettings, RawOutput};
use crate::error::DetectionError;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::InputTensor;

/// ONNX Runtime session with a single named input and output.
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(settings: &ModelSettings) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(settings.intra_threads)?;

        let mut builder = match settings.provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?
            }
            #[cfg(not(feature = "cuda"))]
            ExecutionProvider::Cuda => {
                anyhow::bail!("CUDA execution provider requested but the 'cuda' feature is disabled");
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
                builder
            }
        };

        let session = builder.commit_from_file(&settings.model_path)?;

        tracing::info!(
            model_path = %settings.model_path,
            input = %settings.input_name,
            output = %settings.output_name,
            "Model loaded"
        );

        Ok(Self {
            session,
            input_name: settings.input_name.clone(),
            output_name: settings.output_name.clone(),
        })
    }
}

impl InferenceEngine for OrtBackend {
    fn load_model(settings: &ModelSettings) -> anyhow::Result<Self> {
        Self::load_model_with_provider(settings)
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput, DetectionError> {
        let outputs = match input {
            InputTensor::Float(arr) => self.session.run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(arr.view())?
            ])?,
            InputTensor::Quantized(arr) => self.session.run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(arr.view())?
            ])?,
        };

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                DetectionError::inference(format!("model has no output named '{}'", self.output_name))
            })?
            .try_extract_array::<f32>()?;

        Ok(RawOutput::new(output.into_owned()))
    }
}
