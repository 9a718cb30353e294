use super::decode::RawDetection;
use crate::types::BoundingBox;
use preprocess::{FrameTransform, Rotation};
use std::str::FromStr;

/// Coordinate system of the boxes handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSpace {
    /// The upright frame as shown to the user (after rotation).
    #[default]
    Display,
    /// The raw capture buffer orientation (before rotation).
    Sensor,
}

impl FromStr for CoordinateSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "display" => Ok(CoordinateSpace::Display),
            "sensor" | "buffer" => Ok(CoordinateSpace::Sensor),
            other => Err(format!("unknown coordinate space '{}'", other)),
        }
    }
}

/// Inverts the preprocessing transform for decoded detections.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateMapper {
    space: CoordinateSpace,
}

impl CoordinateMapper {
    pub fn new(space: CoordinateSpace) -> Self {
        Self { space }
    }

    /// Map one model-space detection onto the frame.
    ///
    /// Undoes the letterbox shift, then the scale, then (for sensor space) the
    /// rotation. The result is clamped to the target frame; `None` when clamping
    /// leaves no area.
    pub fn map(&self, detection: &RawDetection, transform: &FrameTransform) -> Option<BoundingBox> {
        let (x1, y1) = unscale(detection.left, detection.top, transform);
        let (x2, y2) = unscale(detection.right, detection.bottom, transform);

        let (dw, dh) = (
            transform.display_size.0 as f32,
            transform.display_size.1 as f32,
        );
        let left = x1.min(x2).clamp(0.0, dw);
        let right = x1.max(x2).clamp(0.0, dw);
        let top = y1.min(y2).clamp(0.0, dh);
        let bottom = y1.max(y2).clamp(0.0, dh);

        let (left, top, right, bottom) = match self.space {
            CoordinateSpace::Display => (left, top, right, bottom),
            CoordinateSpace::Sensor => {
                let (ax, ay) = unrotate(left, top, transform);
                let (bx, by) = unrotate(right, bottom, transform);
                (ax.min(bx), ay.min(by), ax.max(bx), ay.max(by))
            }
        };

        // Also rejects NaN, which fails every comparison.
        if !(left < right && top < bottom) {
            return None;
        }

        Some(BoundingBox {
            left,
            top,
            right,
            bottom,
            confidence: detection.score,
            class_id: detection.class_id,
            label: None,
        })
    }

    /// Map a decoded batch, dropping degenerate boxes and attaching class labels.
    pub fn map_all(
        &self,
        detections: &[RawDetection],
        transform: &FrameTransform,
        labels: &[String],
    ) -> Vec<BoundingBox> {
        detections
            .iter()
            .filter_map(|d| {
                let mut mapped = self.map(d, transform)?;
                mapped.label = labels.get(d.class_id as usize).cloned();
                Some(mapped)
            })
            .collect()
    }
}

/// Model input pixels to upright frame pixels.
#[inline]
fn unscale(x: f32, y: f32, t: &FrameTransform) -> (f32, f32) {
    ((x - t.offset_x) / t.scale_x, (y - t.offset_y) / t.scale_y)
}

/// Upright frame pixels back to the buffer orientation (`W×H` = source size).
#[inline]
fn unrotate(x: f32, y: f32, t: &FrameTransform) -> (f32, f32) {
    let (w, h) = (t.source_size.0 as f32, t.source_size.1 as f32);
    match t.rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (y, h - x),
        Rotation::Deg180 => (w - x, h - y),
        Rotation::Deg270 => (w - y, x),
    }
}
