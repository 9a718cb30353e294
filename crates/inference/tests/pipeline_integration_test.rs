use inference::{
    BoundingBox, CoordinateSpace, DetectionError, DetectionPipeline, DetectionService,
    InferenceEngine, ModelSettings, OverlaySink, PipelineConfig, PipelineState, RawOutput,
    frame_channel, overlay_channel,
};
use ndarray::{Array, IxDyn};
use preprocess::{Frame, InputTensor, PixelFormat, PreprocessConfig, ResizeMode, Rotation};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Engine returning a fixed attributes-major output, with scripted failures.
struct ScriptedEngine {
    output: RawOutput,
    fail_on: HashSet<usize>,
    calls: Arc<AtomicUsize>,
    ready: Arc<AtomicBool>,
}

impl ScriptedEngine {
    fn new(boxes: &[(f32, f32, f32, f32, f32)]) -> Self {
        Self {
            output: attributes_output(boxes),
            fail_on: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    fn load_model(_settings: &ModelSettings) -> anyhow::Result<Self> {
        anyhow::bail!("model file not found")
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn run(&mut self, _input: &InputTensor) -> Result<RawOutput, DetectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(DetectionError::inference("scripted failure"));
        }
        Ok(self.output.clone())
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    published: Arc<Mutex<Vec<Vec<BoundingBox>>>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl OverlaySink for RecordingSink {
    fn set_bounding_boxes(&mut self, boxes: Vec<BoundingBox>) {
        self.published.lock().unwrap().push(boxes);
    }
}

/// `[1, 5, N]` output from (cx, cy, w, h, score) tuples
fn attributes_output(boxes: &[(f32, f32, f32, f32, f32)]) -> RawOutput {
    let n = boxes.len();
    let mut data = vec![0.0f32; 5 * n];
    for (i, (cx, cy, w, h, score)) in boxes.iter().enumerate() {
        data[i] = *cx;
        data[n + i] = *cy;
        data[2 * n + i] = *w;
        data[3 * n + i] = *h;
        data[4 * n + i] = *score;
    }
    RawOutput::new(Array::from_shape_vec(IxDyn(&[1, 5, n]), data).unwrap())
}

fn stretch_config(input: (u32, u32), space: CoordinateSpace) -> PipelineConfig {
    PipelineConfig {
        preprocess: PreprocessConfig {
            input_size: input,
            resize_mode: ResizeMode::Stretch,
            ..PreprocessConfig::default()
        },
        coordinate_space: space,
        ..PipelineConfig::default()
    }
}

fn frame(width: u32, height: u32, rotation: Rotation) -> Frame {
    let pixels = vec![90u8; width as usize * height as usize * 4];
    Frame::new(pixels, width, height, PixelFormat::Rgba8, rotation).unwrap()
}

fn ready_pipeline(config: PipelineConfig, engine: ScriptedEngine) -> DetectionPipeline<ScriptedEngine> {
    let mut pipeline = DetectionPipeline::new(config);
    pipeline.initialize(engine).unwrap();
    pipeline
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Condition not reached in time");
}

fn assert_rect(b: &BoundingBox, expected: (f32, f32, f32, f32)) {
    let eps = 1e-2;
    assert!(
        (b.left - expected.0).abs() < eps
            && (b.top - expected.1).abs() < eps
            && (b.right - expected.2).abs() < eps
            && (b.bottom - expected.3).abs() < eps,
        "got ({}, {}, {}, {}), expected {:?}",
        b.left,
        b.top,
        b.right,
        b.bottom,
        expected
    );
}

/// Locates the bright region in channel 0 of an NCHW float input and reports
/// it as a single detection, so the box comes from the tensor content itself.
struct BrightBlockEngine;

impl InferenceEngine for BrightBlockEngine {
    fn load_model(_settings: &ModelSettings) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput, DetectionError> {
        let tensor = input.as_float().expect("float input");
        let shape = tensor.shape();
        let (height, width) = (shape[2], shape[3]);

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
        for y in 0..height {
            for x in 0..width {
                if tensor[[0, 0, y, x]] > 0.5 {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x + 1);
                    max_y = max_y.max(y + 1);
                }
            }
        }
        assert!(min_x < max_x && min_y < max_y, "Block not found in tensor");

        let (w, h) = ((max_x - min_x) as f32, (max_y - min_y) as f32);
        let (cx, cy) = (min_x as f32 + w / 2.0, min_y as f32 + h / 2.0);
        Ok(attributes_output(&[(cx, cy, w, h, 0.95)]))
    }
}

/// 1920x1080 black frame with a white block covering source (x0,y0)-(x1,y1)
fn frame_with_block(x0: usize, y0: usize, x1: usize, y1: usize, rotation: Rotation) -> Frame {
    let (width, height) = (1920usize, 1080usize);
    let mut pixels = vec![0u8; width * height * 3];
    for y in y0..y1 {
        for x in x0..x1 {
            let idx = (y * width + x) * 3;
            pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
        }
    }
    Frame::new(pixels, width as u32, height as u32, PixelFormat::Rgb8, rotation).unwrap()
}

fn letterbox_config(space: CoordinateSpace) -> PipelineConfig {
    PipelineConfig {
        preprocess: PreprocessConfig::with_input_size((640, 640)),
        coordinate_space: space,
        ..PipelineConfig::default()
    }
}

fn assert_rect_within(b: &BoundingBox, expected: (f32, f32, f32, f32), tolerance: f32) {
    let got = (b.left, b.top, b.right, b.bottom);
    assert!(
        (got.0 - expected.0).abs() <= tolerance
            && (got.1 - expected.1).abs() <= tolerance
            && (got.2 - expected.2).abs() <= tolerance
            && (got.3 - expected.3).abs() <= tolerance,
        "got {:?}, expected {:?} (+/- {})",
        got,
        expected,
        tolerance
    );
}

/// Rotated 90 and letterboxed into 640x640 (scale 1/3, 140 px side bands):
/// the block sits at display (780,600)-(980,800) once the frame is upright.
#[test]
fn test_block_in_rotated_letterboxed_frame_maps_back_to_display() {
    let mut pipeline = DetectionPipeline::new(letterbox_config(CoordinateSpace::Display));
    pipeline.initialize(BrightBlockEngine).unwrap();

    let boxes = pipeline
        .process(frame_with_block(600, 100, 800, 300, Rotation::Deg90))
        .unwrap();

    assert_eq!(boxes.len(), 1);
    // One model pixel is three display pixels at this scale
    assert_rect_within(&boxes[0], (780.0, 600.0, 980.0, 800.0), 3.0);
}

#[test]
fn test_block_in_rotated_letterboxed_frame_maps_back_to_sensor() {
    let mut pipeline = DetectionPipeline::new(letterbox_config(CoordinateSpace::Sensor));
    pipeline.initialize(BrightBlockEngine).unwrap();

    let boxes = pipeline
        .process(frame_with_block(600, 100, 800, 300, Rotation::Deg90))
        .unwrap();

    assert_eq!(boxes.len(), 1);
    assert_rect_within(&boxes[0], (600.0, 100.0, 800.0, 300.0), 3.0);
}

#[test]
fn test_block_maps_back_for_every_rotation() {
    for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
        let mut pipeline = DetectionPipeline::new(letterbox_config(CoordinateSpace::Sensor));
        pipeline.initialize(BrightBlockEngine).unwrap();

        let boxes = pipeline
            .process(frame_with_block(1200, 450, 1500, 600, rotation))
            .unwrap();

        assert_eq!(boxes.len(), 1, "rotation {:?}", rotation);
        assert_rect_within(&boxes[0], (1200.0, 450.0, 1500.0, 600.0), 3.0);
    }
}

/// Portrait-mounted camera: 1920x1080 buffer, rotated 90 to a 1080x1920 display,
/// stretched into a 300x300 input. Model box (100,100)-(200,200).
#[test]
fn test_rotated_frame_maps_to_display_space() {
    let engine = ScriptedEngine::new(&[(150.0, 150.0, 100.0, 100.0, 0.9)]);
    let mut pipeline = ready_pipeline(stretch_config((300, 300), CoordinateSpace::Display), engine);

    let boxes = pipeline.process(frame(1920, 1080, Rotation::Deg90)).unwrap();

    assert_eq!(boxes.len(), 1);
    assert_rect(&boxes[0], (360.0, 640.0, 720.0, 1280.0));
    assert_eq!(boxes[0].confidence, 0.9);
    assert_eq!(boxes[0].label.as_deref(), Some("license_plate"));
}

#[test]
fn test_rotated_frame_maps_to_sensor_space() {
    let engine = ScriptedEngine::new(&[(150.0, 150.0, 100.0, 100.0, 0.9)]);
    let mut pipeline = ready_pipeline(stretch_config((300, 300), CoordinateSpace::Sensor), engine);

    let boxes = pipeline.process(frame(1920, 1080, Rotation::Deg90)).unwrap();

    assert_eq!(boxes.len(), 1);
    assert_rect(&boxes[0], (640.0, 360.0, 1280.0, 720.0));
}

#[test]
fn test_duplicates_suppressed_and_output_capped() {
    let mut boxes = vec![
        (50.0, 50.0, 20.0, 20.0, 0.9),
        (52.0, 52.0, 20.0, 20.0, 0.8),
    ];
    for i in 0..30 {
        boxes.push((100.0 + i as f32 * 6.0, 200.0, 4.0, 4.0, 0.6));
    }
    let engine = ScriptedEngine::new(&boxes);
    let mut pipeline = ready_pipeline(stretch_config((640, 640), CoordinateSpace::Display), engine);

    let result = pipeline.process(frame(640, 640, Rotation::Deg0)).unwrap();

    assert_eq!(result.len(), 10, "Capped at the default max detections");
    assert_rect(&result[0], (40.0, 40.0, 60.0, 60.0));
    assert!(result[1..].iter().all(|b| b.confidence == 0.6));
}

#[test]
fn test_missing_model_is_fatal_at_load() {
    let settings = ModelSettings {
        model_path: "/does/not/exist.onnx".to_string(),
        input_name: "images".to_string(),
        output_name: "output0".to_string(),
        provider: Default::default(),
        intra_threads: 1,
    };

    let result = DetectionPipeline::<ScriptedEngine>::load(PipelineConfig::default(), &settings);
    assert!(result.is_err());
}

#[test]
fn test_output_shape_mismatch_is_frame_local() {
    let mut engine = ScriptedEngine::new(&[]);
    engine.output = RawOutput::new(Array::zeros(IxDyn(&[1, 84, 8400])));
    let mut pipeline = ready_pipeline(PipelineConfig::default(), engine);

    let err = pipeline.process(frame(64, 48, Rotation::Deg0)).unwrap_err();
    assert!(matches!(err, DetectionError::ModelInference(_)));
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_processes_only_latest_frame() {
    let engine = ScriptedEngine::new(&[(320.0, 320.0, 64.0, 32.0, 0.8)]);
    let calls = engine.calls.clone();
    let pipeline = ready_pipeline(stretch_config((640, 640), CoordinateSpace::Display), engine);

    let (frame_tx, frame_rx) = frame_channel();
    let (publisher, overlay) = overlay_channel();

    for _ in 0..5 {
        frame_tx.submit(frame(640, 640, Rotation::Deg0));
    }
    drop(frame_tx);

    let stats = DetectionService::new(pipeline, frame_rx, publisher)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 4);
    assert_eq!(stats.detections, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let latest = overlay.latest();
    assert_eq!(latest.len(), 1);
    assert_rect(&latest[0], (288.0, 304.0, 352.0, 336.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_frame_publishes_nothing() {
    let mut engine = ScriptedEngine::new(&[(100.0, 100.0, 20.0, 20.0, 0.9)]);
    engine.fail_on.insert(2);
    let calls = engine.calls.clone();
    let pipeline = ready_pipeline(stretch_config((640, 640), CoordinateSpace::Display), engine);

    let (frame_tx, frame_rx) = frame_channel();
    let sink = RecordingSink::default();
    let worker = tokio::spawn(DetectionService::new(pipeline, frame_rx, sink.clone()).run());

    frame_tx.submit(frame(640, 640, Rotation::Deg0));
    wait_until(|| sink.count() == 1).await;

    frame_tx.submit(frame(640, 640, Rotation::Deg0));
    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;

    frame_tx.submit(frame(640, 640, Rotation::Deg0));
    drop(frame_tx);

    let stats = worker.await.unwrap().unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 0);

    let published = sink.published.lock().unwrap();
    assert_eq!(published.len(), 2, "The failed frame must not reach the sink");
    assert!(published.iter().all(|boxes| boxes.len() == 1));
}

#[tokio::test]
async fn test_worker_on_current_thread_runtime() {
    let engine = ScriptedEngine::new(&[]);
    let pipeline = ready_pipeline(stretch_config((64, 64), CoordinateSpace::Display), engine);

    let (frame_tx, frame_rx) = frame_channel();
    let sink = RecordingSink::default();

    frame_tx.submit(frame(32, 32, Rotation::Deg180));
    drop(frame_tx);

    let stats = DetectionService::new(pipeline, frame_rx, sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.detections, 0);
    // An empty result is still published: "no detections this frame"
    assert_eq!(sink.published.lock().unwrap().as_slice(), &[Vec::<BoundingBox>::new()]);
}

#[tokio::test]
async fn test_worker_rejects_uninitialized_pipeline() {
    let pipeline = DetectionPipeline::<ScriptedEngine>::new(PipelineConfig::default());
    let (_frame_tx, frame_rx) = frame_channel();

    let result = DetectionService::new(pipeline, frame_rx, RecordingSink::default())
        .run()
        .await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_loss_stops_worker() {
    let engine = ScriptedEngine::new(&[]);
    let ready = engine.ready.clone();
    let pipeline = ready_pipeline(PipelineConfig::default(), engine);

    let (frame_tx, frame_rx) = frame_channel();
    let sink = RecordingSink::default();
    let worker = tokio::spawn(DetectionService::new(pipeline, frame_rx, sink.clone()).run());

    frame_tx.submit(frame(64, 64, Rotation::Deg0));
    wait_until(|| sink.count() == 1).await;

    ready.store(false, Ordering::SeqCst);
    frame_tx.submit(frame(64, 64, Rotation::Deg0));

    let err = worker.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("not ready"));
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn test_worker_rejects_pipeline_with_unready_engine() {
    let engine = ScriptedEngine::new(&[]);
    engine.ready.store(false, Ordering::SeqCst);
    let pipeline = ready_pipeline(PipelineConfig::default(), engine);
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);

    let (_frame_tx, frame_rx) = frame_channel();
    let err = DetectionService::new(pipeline, frame_rx, RecordingSink::default())
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Uninitialized"));
}
