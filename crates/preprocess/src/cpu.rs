use crate::config::{PreprocessConfig, TensorLayout, TensorType};
use crate::error::PreprocessError;
use crate::frame::{Frame, PixelFormat, Rotation};
use crate::tensor::InputTensor;
use crate::transform::FrameTransform;
use crate::PreprocessResult;
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::{ImageBuffer, Rgb, imageops};
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;
const RGB_CHANNELS: usize = 3;

pub struct CpuPreProcessor {
    config: PreprocessConfig,
    resizer: Resizer,
    letterboxed_buffer: Vec<u8>,
}

impl CpuPreProcessor {
    pub fn new(config: PreprocessConfig) -> Self {
        let (w, h) = config.input_size;
        Self {
            letterboxed_buffer: vec![LETTERBOX_COLOR; w as usize * h as usize * RGB_CHANNELS],
            resizer: Resizer::new(),
            config,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.config.input_size
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Rotate, resize and normalize `frame` into the model's input tensor.
    ///
    /// The frame itself is only read.
    pub fn preprocess(&mut self, frame: &Frame) -> Result<PreprocessResult, PreprocessError> {
        let _s = span!("preprocess_frame");

        tracing::trace!(
            width = frame.width(),
            height = frame.height(),
            format = ?frame.format(),
            rotation = frame.rotation().degrees(),
            "Preprocessing frame"
        );

        let (in_w, in_h) = self.config.input_size;
        if in_w == 0 || in_h == 0 {
            return Err(PreprocessError::invalid(format!(
                "model input size must be non-zero, got {}x{}",
                in_w, in_h
            )));
        }
        if frame.is_empty() {
            return Err(PreprocessError::invalid(format!(
                "zero-area frame {}x{}",
                frame.width(),
                frame.height()
            )));
        }

        let rgb = Self::to_rgb(frame);
        let (upright, width, height) =
            Self::rotate(rgb, frame.width(), frame.height(), frame.rotation())?;

        let transform = FrameTransform::compute(
            (frame.width(), frame.height()),
            frame.rotation(),
            self.config.input_size,
            self.config.resize_mode,
        );
        debug_assert_eq!((width, height), transform.display_size);

        self.resize_into_input(&upright, &transform)?;
        let tensor = self.to_tensor()?;

        Ok(PreprocessResult { tensor, transform })
    }

    /// Repack any supported pixel format as tightly packed RGB8.
    fn to_rgb(frame: &Frame) -> Vec<u8> {
        let _s = span!("to_rgb");

        let pixels = frame.pixels();
        match frame.format() {
            PixelFormat::Rgb8 => pixels.to_vec(),
            PixelFormat::Bgr8 => pixels
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Rgba8 => pixels
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::Bgra8 => pixels
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        }
    }

    /// Rotate clockwise so the buffer is upright. Returns the new buffer and its size.
    fn rotate(
        rgb: Vec<u8>,
        width: u32,
        height: u32,
        rotation: Rotation,
    ) -> Result<(Vec<u8>, u32, u32), PreprocessError> {
        if rotation == Rotation::Deg0 {
            return Ok((rgb, width, height));
        }

        let _s = span!("rotate");

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_raw(width, height, rgb)
            .ok_or_else(|| PreprocessError::invalid("failed to create image buffer"))?;

        let rotated = match rotation {
            Rotation::Deg90 => imageops::rotate90(&img),
            Rotation::Deg180 => imageops::rotate180(&img),
            Rotation::Deg270 => imageops::rotate270(&img),
            Rotation::Deg0 => img,
        };

        let (w, h) = rotated.dimensions();
        Ok((rotated.into_raw(), w, h))
    }

    /// Bilinear resize into the scratch input buffer at the letterbox offset.
    fn resize_into_input(
        &mut self,
        upright: &[u8],
        transform: &FrameTransform,
    ) -> Result<(), PreprocessError> {
        let _s = span!("resize_and_letterbox");

        let (src_w, src_h) = transform.display_size;
        let (new_width, new_height) = transform.resized_size;
        let offset_x = transform.offset_x as u32;
        let offset_y = transform.offset_y as u32;

        let src = ImageRef::new(src_w, src_h, upright, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = transform.input_size.0 as usize * RGB_CHANNELS;
        let row_bytes = new_width as usize * RGB_CHANNELS;

        for y in 0..new_height as usize {
            let src_row = y * row_bytes;
            let dst_row = (y + offset_y as usize) * stride + offset_x as usize * RGB_CHANNELS;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        Ok(())
    }

    fn to_tensor(&self) -> Result<InputTensor, PreprocessError> {
        let _s = span!("normalize");

        let (w, h) = self.config.input_size;
        let (width, height) = (w as usize, h as usize);
        let spatial = width * height;
        let shape = match self.config.layout {
            TensorLayout::Nchw => [1, RGB_CHANNELS, height, width],
            TensorLayout::Nhwc => [1, height, width, RGB_CHANNELS],
        };

        let buf = &self.letterboxed_buffer;
        let tensor = match self.config.tensor_type {
            TensorType::UInt8 => {
                let data = match self.config.layout {
                    TensorLayout::Nhwc => buf.clone(),
                    TensorLayout::Nchw => {
                        let mut planar = vec![0u8; RGB_CHANNELS * spatial];
                        for (i, px) in buf.chunks_exact(RGB_CHANNELS).enumerate() {
                            for c in 0..RGB_CHANNELS {
                                planar[c * spatial + i] = px[c];
                            }
                        }
                        planar
                    }
                };
                InputTensor::Quantized(Array::from_shape_vec(IxDyn(&shape), data)?)
            }
            TensorType::Float32 => {
                let norm = self.config.normalization;
                let mut output = vec![0.0f32; RGB_CHANNELS * spatial];
                for (i, px) in buf.chunks_exact(RGB_CHANNELS).enumerate() {
                    for c in 0..RGB_CHANNELS {
                        let idx = match self.config.layout {
                            TensorLayout::Nchw => c * spatial + i,
                            TensorLayout::Nhwc => i * RGB_CHANNELS + c,
                        };
                        output[idx] = norm.apply(c, px[c]);
                    }
                }
                InputTensor::Float(Array::from_shape_vec(IxDyn(&shape), output)?)
            }
        };

        Ok(tensor)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}
