use crate::backend::{InferenceEngine, ModelSettings};
use crate::error::DetectionError;
use crate::processing::{CoordinateMapper, CoordinateSpace, DecoderConfig, DetectionDecoder};
use crate::types::BoundingBox;
use common::span;
use preprocess::{CpuPreProcessor, Frame, PreprocessConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed without an engine.
    Uninitialized,
    Ready,
    /// Inside `process`.
    Processing,
    /// Engine released; every call fails.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub decoder: DecoderConfig,
    pub coordinate_space: CoordinateSpace,
    /// Class labels indexed by class id.
    pub labels: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            decoder: DecoderConfig::default(),
            coordinate_space: CoordinateSpace::default(),
            labels: vec!["license_plate".to_string()],
        }
    }
}

/// Frame in, display-space boxes out.
///
/// Owns its engine exclusively; `&mut self` on `process` serializes every call
/// into it. Nothing is carried from one frame to the next.
pub struct DetectionPipeline<E: InferenceEngine> {
    state: PipelineState,
    engine: Option<E>,
    preprocessor: CpuPreProcessor,
    decoder: DetectionDecoder,
    mapper: CoordinateMapper,
    labels: Vec<String>,
}

impl<E: InferenceEngine> DetectionPipeline<E> {
    /// Build the stages without an engine. `process` fails until [`Self::initialize`].
    pub fn new(config: PipelineConfig) -> Self {
        let decoder = DetectionDecoder::new(config.decoder, config.preprocess.input_size);
        Self {
            state: PipelineState::Uninitialized,
            engine: None,
            preprocessor: CpuPreProcessor::new(config.preprocess),
            decoder,
            mapper: CoordinateMapper::new(config.coordinate_space),
            labels: config.labels,
        }
    }

    /// Load the model and return a ready pipeline. Load failures are fatal.
    pub fn load(config: PipelineConfig, settings: &ModelSettings) -> anyhow::Result<Self> {
        tracing::info!(model_path = %settings.model_path, "Loading detection model");
        let engine = E::load_model(settings)?;

        let mut pipeline = Self::new(config);
        pipeline.initialize(engine)?;
        tracing::info!("Detection model loaded");
        Ok(pipeline)
    }

    /// Attach an engine. A closed pipeline cannot be revived.
    pub fn initialize(&mut self, engine: E) -> Result<(), DetectionError> {
        if self.state == PipelineState::Closed {
            return Err(DetectionError::PipelineClosed);
        }
        self.engine = Some(engine);
        self.state = PipelineState::Ready;
        Ok(())
    }

    /// Stays `Uninitialized` while the attached engine reports it cannot run.
    pub fn state(&self) -> PipelineState {
        match (self.state, &self.engine) {
            (PipelineState::Ready, Some(engine)) if !engine.is_ready() => {
                PipelineState::Uninitialized
            }
            (state, _) => state,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.preprocessor.input_size()
    }

    /// Detect plates in one frame.
    ///
    /// Runs preprocess, inference, decode and mapping to completion on the
    /// calling thread. On error no boxes are returned and the pipeline goes
    /// back to `Ready`, so the next frame can be processed normally.
    pub fn process(&mut self, frame: Frame) -> Result<Vec<BoundingBox>, DetectionError> {
        match self.state {
            PipelineState::Closed => return Err(DetectionError::PipelineClosed),
            PipelineState::Uninitialized => return Err(DetectionError::EngineNotReady),
            PipelineState::Ready | PipelineState::Processing => {}
        }

        let Self {
            state,
            engine,
            preprocessor,
            decoder,
            mapper,
            labels,
        } = self;

        let engine = match engine.as_mut() {
            Some(engine) if engine.is_ready() => engine,
            _ => return Err(DetectionError::EngineNotReady),
        };

        *state = PipelineState::Processing;
        let _s = span!("detect_frame");

        let result = (|| -> Result<Vec<BoundingBox>, DetectionError> {
            let prepared = preprocessor.preprocess(&frame)?;
            drop(frame);

            let raw = {
                let _infer_span = span!("model_inference");
                engine.run(&prepared.tensor)?
            };

            let detections = decoder.decode(&raw)?;
            Ok(mapper.map_all(&detections, &prepared.transform, labels))
        })();

        *state = PipelineState::Ready;
        result
    }

    /// Release the engine. Idempotent.
    pub fn close(&mut self) {
        if self.state != PipelineState::Closed {
            tracing::info!("Closing detection pipeline");
        }
        self.engine = None;
        self.state = PipelineState::Closed;
    }
}
