use crate::backend::{BOX_ATTRIBUTES, BoxUnits, OutputSpec, RawOutput};
use crate::error::DetectionError;

/// One surviving candidate in model input pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub score: f32,
    pub class_id: u16,
    /// Row of the candidate in the raw output, used to break score ties.
    pub index: usize,
}

impl RawDetection {
    pub fn area(&self) -> f32 {
        (self.right - self.left).max(0.0) * (self.bottom - self.top).max(0.0)
    }

    /// Intersection-over-union; zero when the union is empty.
    pub fn iou(&self, other: &RawDetection) -> f32 {
        let x1 = self.left.max(other.left);
        let y1 = self.top.max(other.top);
        let x2 = self.right.min(other.right);
        let y2 = self.bottom.min(other.bottom);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub score_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Suppress overlaps across classes, not only within one.
    pub class_agnostic: bool,
    pub output: OutputSpec,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 10,
            class_agnostic: true,
            output: OutputSpec::default(),
        }
    }
}

pub struct DetectionDecoder {
    config: DecoderConfig,
    input_size: (u32, u32),
}

impl DetectionDecoder {
    pub fn new(config: DecoderConfig, input_size: (u32, u32)) -> Self {
        Self { config, input_size }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Threshold, convert and de-duplicate raw candidates.
    ///
    /// Output is ordered by descending score, ties broken by raw row index, and
    /// holds at most `max_detections` entries. An output with no candidate above
    /// the threshold decodes to an empty list.
    #[tracing::instrument(skip_all, fields(candidates = tracing::field::Empty, kept = tracing::field::Empty))]
    pub fn decode(&self, raw: &RawOutput) -> Result<Vec<RawDetection>, DetectionError> {
        let rows = raw.candidates(&self.config.output)?;
        let span = tracing::Span::current();
        span.record("candidates", rows.nrows());

        let (unit_w, unit_h) = match self.config.output.box_units {
            BoxUnits::Pixels => (1.0, 1.0),
            BoxUnits::Normalized => (self.input_size.0 as f32, self.input_size.1 as f32),
        };
        let activation = self.config.output.activation;

        let mut candidates = Vec::new();

        for (index, row) in rows.outer_iter().enumerate() {
            // Argmax over classes; the lowest class index wins ties.
            let mut score = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for (c, &value) in row.iter().skip(BOX_ATTRIBUTES).enumerate() {
                let s = activation.apply(value);
                if s > score {
                    score = s;
                    class_id = c;
                }
            }

            if !score.is_finite() || score < self.config.score_threshold {
                continue;
            }

            let cx = row[0] * unit_w;
            let cy = row[1] * unit_h;
            let w = row[2] * unit_w;
            let h = row[3] * unit_h;
            let (left, top, right, bottom) = cxcywh_to_xyxy(cx, cy, w, h);

            if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
                continue;
            }

            let class_id = u16::try_from(class_id).map_err(|_| {
                DetectionError::inference(format!(
                    "class index {} does not fit a u16 class id",
                    class_id
                ))
            })?;

            candidates.push(RawDetection {
                left,
                top,
                right,
                bottom,
                score,
                class_id,
                index,
            });
        }

        let kept = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.max_detections,
            self.config.class_agnostic,
        );

        span.record("kept", kept.len());
        tracing::trace!(kept = kept.len(), "Decoded detections");

        Ok(kept)
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
pub fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

/// Greedy NMS over already thresholded candidates.
///
/// Candidates are visited by descending score (stable on raw index). Each kept
/// box suppresses every later box whose IoU with it is strictly above
/// `iou_threshold`. Stops once `max_detections` boxes are kept.
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
    class_agnostic: bool,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));

    let n = candidates.len();
    let mut suppressed = vec![false; n];
    let mut keep = Vec::with_capacity(max_detections.min(n));

    for i in 0..n {
        if keep.len() >= max_detections {
            break;
        }
        if suppressed[i] {
            continue;
        }

        let best = candidates[i];
        keep.push(best);

        for j in (i + 1)..n {
            if suppressed[j] {
                continue;
            }
            if !class_agnostic && candidates[j].class_id != best.class_id {
                continue;
            }
            if best.iou(&candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
