use crate::{
    backend::InferenceEngine,
    channel::FrameReceiver,
    overlay::OverlaySink,
    pipeline::{DetectionPipeline, PipelineState},
};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Counters returned when the worker loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub detections: u64,
}

struct WorkerMetrics {
    duration: Histogram<f64>,
    frames: Counter<u64>,
    failed: Counter<u64>,
    skipped: Counter<u64>,
    detections: Counter<u64>,
}

impl WorkerMetrics {
    fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.001, 0.002, 0.005, 0.007, 0.01, 0.015, 0.02, 0.025, 0.03, 0.04, 0.05, 0.075, 0.1,
            0.15, 0.2, 0.5,
        ];

        Self {
            duration: meter
                .f64_histogram("detector_frame_duration_seconds")
                .with_description("Time to process a single frame (preprocess + infer + decode + map)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            frames: meter
                .u64_counter("detector_frames_total")
                .with_description("Total frames processed")
                .build(),
            failed: meter
                .u64_counter("detector_frames_failed_total")
                .with_description("Total frames dropped because a stage failed")
                .build(),
            skipped: meter
                .u64_counter("detector_frames_skipped_total")
                .with_description("Total frames replaced before the worker picked them up")
                .build(),
            detections: meter
                .u64_counter("detector_detections_total")
                .with_description("Total boxes published")
                .build(),
        }
    }
}

/// Single worker that feeds the newest frame through the pipeline and
/// publishes the boxes.
pub struct DetectionService<E: InferenceEngine, S: OverlaySink> {
    pipeline: DetectionPipeline<E>,
    frames: FrameReceiver,
    sink: S,
}

impl<E: InferenceEngine, S: OverlaySink> DetectionService<E, S> {
    pub fn new(pipeline: DetectionPipeline<E>, frames: FrameReceiver, sink: S) -> Self {
        Self {
            pipeline,
            frames,
            sink,
        }
    }

    /// Process frames until every sender is dropped, then close the pipeline.
    ///
    /// A frame that fails is logged and publishes nothing; the renderer keeps
    /// its previous result. Only pipeline-level failures end the loop early.
    pub async fn run(mut self) -> anyhow::Result<ServiceStats> {
        if self.pipeline.state() != PipelineState::Ready {
            anyhow::bail!(
                "Detection pipeline must be ready before starting the worker (state: {:?})",
                self.pipeline.state()
            );
        }

        tracing::info!("Detection worker starting");

        let metrics = WorkerMetrics::new("plate-detector");
        let mut stats = ServiceStats::default();

        while let Some(received) = self.frames.next_frame().await {
            if received.skipped > 0 {
                stats.skipped += received.skipped;
                metrics.skipped.add(received.skipped, &[]);
                tracing::trace!(skipped = received.skipped, "Skipped frames to process latest");
            }

            let sequence = received.sequence;
            let start = Instant::now();
            let pipeline = &mut self.pipeline;
            let result = run_blocking(move || pipeline.process(received.frame));

            match result {
                Ok(boxes) => {
                    metrics.duration.record(start.elapsed().as_secs_f64(), &[]);
                    metrics.frames.add(1, &[]);
                    metrics.detections.add(boxes.len() as u64, &[]);

                    stats.processed += 1;
                    stats.detections += boxes.len() as u64;

                    if stats.processed.is_multiple_of(10) {
                        tracing::debug!(
                            frames_processed = stats.processed,
                            frames_skipped = stats.skipped,
                            total_detections = stats.detections,
                            detections = boxes.len(),
                            "Frame processed"
                        );
                    }

                    self.sink.set_bounding_boxes(boxes);
                }
                Err(e) if e.is_frame_local() => {
                    stats.failed += 1;
                    metrics.failed.add(1, &[]);
                    tracing::warn!(sequence, error = %e, "Failed to process frame");
                }
                Err(e) => {
                    tracing::error!(sequence, error = %e, "Detection pipeline unusable, stopping worker");
                    self.pipeline.close();
                    return Err(e.into());
                }
            }
        }

        self.pipeline.close();
        tracing::info!(
            frames_processed = stats.processed,
            frames_failed = stats.failed,
            frames_skipped = stats.skipped,
            total_detections = stats.detections,
            "Detection worker stopped"
        );

        Ok(stats)
    }
}

/// Run blocking work without stalling other tasks on a multi-threaded runtime.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
