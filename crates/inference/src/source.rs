use crate::channel::FrameSender;
use anyhow::{Context, Result};
use preprocess::{Frame, PixelFormat, Rotation};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const IMAGE_PATTERNS: &[&str] = &["*.jpg", "*.jpeg", "*.png"];

/// Replays still images from a directory as if they came from a camera.
pub struct DirectoryFrameSource {
    paths: Vec<PathBuf>,
    rotation: Rotation,
}

impl DirectoryFrameSource {
    pub fn new(dir: &Path, rotation: Rotation) -> Result<Self> {
        let mut paths = Vec::new();
        for pattern in IMAGE_PATTERNS {
            let pattern = dir.join(pattern);
            let pattern = pattern
                .to_str()
                .with_context(|| format!("Non UTF-8 frame directory: {}", dir.display()))?;
            for entry in glob::glob(pattern).context("Invalid frame glob pattern")? {
                paths.push(entry?);
            }
        }
        paths.sort();

        if paths.is_empty() {
            anyhow::bail!("No jpg or png images found in {}", dir.display());
        }

        tracing::info!(dir = %dir.display(), frames = paths.len(), "Frame source ready");
        Ok(Self { paths, rotation })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Decode one image into an owned RGBA frame.
    pub fn load_frame(&self, path: &Path) -> Result<Frame> {
        let image = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();

        // The decoded buffer is only borrowed for the copy and released right after.
        let frame = Frame::copy_from_strided(
            image.as_raw(),
            width,
            height,
            width as usize * PixelFormat::Rgba8.bytes_per_pixel(),
            PixelFormat::Rgba8,
            self.rotation,
        )?;
        Ok(frame)
    }

    /// Submit every image once, pausing `interval` between frames.
    ///
    /// Blocking; run it on its own thread. Stops early when the receiver is
    /// gone. Images that fail to decode are logged and skipped. Returns the
    /// number of frames submitted.
    pub fn replay(&self, sender: &FrameSender, interval: Duration) -> u64 {
        let mut submitted = 0u64;

        for path in &self.paths {
            if sender.is_closed() {
                tracing::info!("Frame receiver closed, stopping replay");
                break;
            }

            match self.load_frame(path) {
                Ok(frame) => {
                    let sequence = sender.submit(frame);
                    submitted += 1;
                    tracing::trace!(sequence, path = %path.display(), "Frame submitted");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable frame");
                }
            }

            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }

        submitted
    }
}
