use crate::error::PreprocessError;
use std::sync::Arc;

/// Pixel layouts a capture source may hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// Clockwise rotation needed to bring the buffer upright for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Size of a `width`x`height` buffer after this rotation.
    pub fn rotated_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = PreprocessError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees % 360 {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(PreprocessError::invalid(format!(
                "rotation must be a multiple of 90 degrees, got {}",
                other
            ))),
        }
    }
}

/// An owned, tightly packed camera frame.
///
/// Pixel data sits behind an `Arc` so handing the frame between threads or
/// keeping it in a latest-value slot never copies the buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    rotation: Rotation,
    pixels: Arc<[u8]>,
}

impl Frame {
    /// Wrap an already packed buffer. The length must match the geometry exactly.
    pub fn new(
        pixels: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        format: PixelFormat,
        rotation: Rotation,
    ) -> Result<Self, PreprocessError> {
        let pixels = pixels.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(PreprocessError::invalid(format!(
                "buffer size mismatch: expected {} bytes for {}x{} {:?}, got {}",
                expected,
                width,
                height,
                format,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            rotation,
            pixels,
        })
    }

    /// Copy rows out of a borrowed, possibly row-padded capture buffer.
    ///
    /// The borrow ends when this returns, so the caller can release the native
    /// buffer right away whether or not the copy succeeded.
    pub fn copy_from_strided(
        buffer: &[u8],
        width: u32,
        height: u32,
        row_stride: usize,
        format: PixelFormat,
        rotation: Rotation,
    ) -> Result<Self, PreprocessError> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if row_stride < row_bytes {
            return Err(PreprocessError::invalid(format!(
                "row stride {} is smaller than row width {} bytes",
                row_stride, row_bytes
            )));
        }

        let rows = height as usize;
        // The last row may omit its padding.
        let required = match rows {
            0 => 0,
            n => (n - 1) * row_stride + row_bytes,
        };
        if buffer.len() < required {
            return Err(PreprocessError::invalid(format!(
                "buffer too small: need {} bytes for {} rows of stride {}, got {}",
                required,
                rows,
                row_stride,
                buffer.len()
            )));
        }

        let mut packed = Vec::with_capacity(row_bytes * rows);
        for row in 0..rows {
            let start = row * row_stride;
            packed.extend_from_slice(&buffer[start..start + row_bytes]);
        }

        Self::new(packed, width, height, format, rotation)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Size of the frame as shown to the user, i.e. after rotation.
    pub fn display_size(&self) -> (u32, u32) {
        self.rotation.rotated_size(self.width, self.height)
    }
}
