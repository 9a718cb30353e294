use common::TelemetryGuard;
use inference::{
    DetectionPipeline, DetectionService, InferenceConfig, frame_channel, logging::setup_logging,
    overlay_channel, source::DirectoryFrameSource,
};
use std::thread;
use std::time::Duration;

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature is required to build the plate-detector binary");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceConfig::from_env()?;

    // The guard installs the subscriber itself when exporting.
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "plate-detector",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let frame_dir = config
        .frame_dir
        .clone()
        .ok_or_else(|| anyhow::anyhow!("FRAME_DIR must point at a directory of frames"))?;
    let source = DirectoryFrameSource::new(&frame_dir, config.frame_rotation)?;

    let pipeline = DetectionPipeline::<Backend>::load(config.pipeline(), &config.model)?;

    let (frame_tx, frame_rx) = frame_channel();
    let (publisher, mut overlay) = overlay_channel();

    let interval = Duration::from_millis(config.frame_interval_ms);
    let producer = thread::Builder::new()
        .name("frame-source".to_string())
        .spawn(move || source.replay(&frame_tx, interval))?;

    // Stand-in renderer: print each published overlay as a JSON line.
    let renderer = tokio::spawn(async move {
        while let Some(boxes) = overlay.changed().await {
            match serde_json::to_string(&*boxes) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize overlay"),
            }
        }
    });

    let stats = DetectionService::new(pipeline, frame_rx, publisher).run().await?;

    let submitted = producer
        .join()
        .map_err(|_| anyhow::anyhow!("Frame source thread panicked"))?;
    renderer.await?;

    tracing::info!(
        submitted,
        processed = stats.processed,
        failed = stats.failed,
        skipped = stats.skipped,
        detections = stats.detections,
        "Replay finished"
    );

    Ok(())
}
