use crate::config::ResizeMode;
use crate::frame::Rotation;

/// Parameters of the forward frame → model-input transform.
///
/// Order of the forward transform: rotate, scale, then shift by the letterbox
/// offset. Coordinate mapping must undo it in exactly the reverse order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    /// Buffer size as captured, before rotation.
    pub source_size: (u32, u32),
    pub rotation: Rotation,
    /// Upright size, i.e. `source_size` after rotation.
    pub display_size: (u32, u32),
    pub input_size: (u32, u32),
    /// Size of the scaled image inside the input (equals `input_size` unless letterboxed).
    pub resized_size: (u32, u32),
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl FrameTransform {
    /// Derive the transform for a frame. Both sizes must be non-zero.
    pub fn compute(
        source_size: (u32, u32),
        rotation: Rotation,
        input_size: (u32, u32),
        mode: ResizeMode,
    ) -> Self {
        let display_size = rotation.rotated_size(source_size.0, source_size.1);
        let (dw, dh) = (display_size.0 as f32, display_size.1 as f32);
        let (iw, ih) = input_size;

        let resized_size = match mode {
            ResizeMode::Stretch => input_size,
            ResizeMode::Letterbox => {
                let scale = (iw as f32 / dw).min(ih as f32 / dh);
                let new_width = ((dw * scale) as u32).clamp(1, iw);
                let new_height = ((dh * scale) as u32).clamp(1, ih);
                (new_width, new_height)
            }
        };

        // Effective per-axis scales after integer truncation of the resized size.
        let scale_x = resized_size.0 as f32 / dw;
        let scale_y = resized_size.1 as f32 / dh;
        let offset_x = ((iw - resized_size.0) / 2) as f32;
        let offset_y = ((ih - resized_size.1) / 2) as f32;

        Self {
            source_size,
            rotation,
            display_size,
            input_size,
            resized_size,
            scale_x,
            scale_y,
            offset_x,
            offset_y,
        }
    }
}
