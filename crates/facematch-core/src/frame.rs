//! Frame type: decoded images as packed RGB8 buffers.

use image::DynamicImage;
use std::path::Path;

/// Bytes per pixel in a [`Frame`].
pub const CHANNELS: usize = 3;

/// A decoded image as packed RGB8 (`width * height * 3` bytes, row-major).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Convert any decoded image to packed RGB8. Alpha is dropped, grey is
    /// replicated, 16-bit samples are narrowed.
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            data: rgb.into_raw(),
            width,
            height,
        }
    }

    /// Decode an image file into a frame.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let image = image::open(path).map_err(|e| FrameError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let frame = Self::from_image(&image);
        if frame.is_empty() {
            return Err(FrameError::Empty(path.display().to_string()));
        }
        Ok(frame)
    }

    /// Wrap an existing RGB8 buffer, checking its length.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB value at (x, y). Out-of-range coordinates read as black.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let off = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[off], self.data[off + 1], self.data[off + 2]]
    }

    /// Average brightness over all channels (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid RGB buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("image has zero width or height: {0}")]
    Empty(String),
}
