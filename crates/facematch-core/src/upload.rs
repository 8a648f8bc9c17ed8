//! Upload validation.
//!
//! An upload is accepted only when its file name (if any) carries an accepted
//! extension, its content sniffs as JPEG or PNG, it fits the size limits, and
//! it decodes completely.

use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// File extensions accepted by the upload form.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no file uploaded")]
    Missing,
    #[error("unsupported file extension {0:?} (accepted: jpg, jpeg, png)")]
    UnsupportedExtension(String),
    #[error("file content is not a JPEG or PNG image")]
    UnsupportedFormat,
    #[error("upload too large: {actual} {unit} exceeds limit of {limit}")]
    TooLarge {
        actual: u64,
        limit: u64,
        unit: &'static str,
    },
    #[error("image is corrupt or truncated: {0}")]
    Corrupt(String),
}

/// Image container formats the form accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// Size limits applied before and during decode.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub max_pixels: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// A fully decoded upload.
pub struct ValidatedImage {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

/// Validate and decode an uploaded file.
pub fn validate(
    bytes: &[u8],
    file_name: Option<&str>,
    limits: &UploadLimits,
) -> Result<ValidatedImage, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Missing);
    }

    if let Some(name) = file_name {
        check_extension(name)?;
    }

    if bytes.len() > limits.max_bytes {
        return Err(UploadError::TooLarge {
            actual: bytes.len() as u64,
            limit: limits.max_bytes as u64,
            unit: "bytes",
        });
    }

    let format = image::guess_format(bytes).map_err(|_| UploadError::UnsupportedFormat)?;
    let kind = ImageKind::from_format(format).ok_or(UploadError::UnsupportedFormat)?;

    // Header-only read so oversized images are rejected before allocating.
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| UploadError::Corrupt(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(UploadError::Corrupt(format!("zero-sized image {width}x{height}")));
    }
    let pixels = width as u64 * height as u64;
    if pixels > limits.max_pixels {
        return Err(UploadError::TooLarge {
            actual: pixels,
            limit: limits.max_pixels,
            unit: "pixels",
        });
    }

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| UploadError::Corrupt(e.to_string()))?;

    tracing::debug!(?kind, width, height, bytes = bytes.len(), "upload validated");

    Ok(ValidatedImage {
        kind,
        width,
        height,
        image,
    })
}

/// `true` when the bytes are a well-formed, decodable JPEG or PNG.
pub fn is_valid_image(bytes: &[u8], file_name: Option<&str>) -> bool {
    validate(bytes, file_name, &UploadLimits::default()).is_ok()
}

fn check_extension(file_name: &str) -> Result<(), UploadError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(UploadError::UnsupportedExtension(ext))
    }
}
