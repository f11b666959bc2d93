//! Client-side staging of the user's image before upload.
//!
//! The hosted model reasons over square 640px inputs, so the original photo
//! is stretched to that canvas and re-encoded as JPEG on this side of the
//! wire. Decoding is bounded at every layer: byte size, probed dimensions,
//! then decoder limits.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    StagingError, MAX_IMAGE_ALLOC, MAX_IMAGE_BYTES, MAX_IMAGE_DIMENSION, STAGED_IMAGE_SIZE,
    STAGED_JPEG_QUALITY,
};

/// Formats the picker accepts. Everything else is refused before decode.
const ALLOWED_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

#[derive(Clone, Debug)]
pub struct StagingConfig {
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
    pub output_size: u32,
    pub jpeg_quality: u8,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_IMAGE_BYTES,
            max_dimension: MAX_IMAGE_DIMENSION,
            max_alloc_bytes: MAX_IMAGE_ALLOC,
            output_size: STAGED_IMAGE_SIZE,
            jpeg_quality: STAGED_JPEG_QUALITY,
        }
    }
}

/// The resized upload payload plus what the shell needs for a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedImage {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub file_name: String,
}

impl StagedImage {
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Validates, decodes, stretches to the staging canvas and re-encodes.
///
/// # Errors
///
/// Returns [`StagingError`] when the input is empty, oversized, an
/// unsupported format, or fails to decode/encode.
pub fn stage_upload(
    raw_bytes: &[u8],
    file_name: &str,
    config: &StagingConfig,
) -> Result<StagedImage, StagingError> {
    if raw_bytes.is_empty() {
        return Err(StagingError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(StagingError::TooLarge {
            size: raw_bytes.len(),
            max: config.max_input_bytes,
        });
    }

    let format = validate_format(raw_bytes)?;

    // Probe dimensions before committing to a full decode so a small file
    // cannot expand into an enormous pixel buffer.
    let (orig_w, orig_h) = probe_dimensions(raw_bytes, config)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);

    let mut reader = ImageReader::with_format(Cursor::new(raw_bytes), format);
    reader.limits(limits);
    let img = reader
        .decode()
        .map_err(|e| StagingError::DecodeFailed(e.to_string()))?;

    debug!(
        format = ?format,
        width = orig_w,
        height = orig_h,
        "image decoded for staging"
    );

    // The detector expects a square canvas; the source aspect ratio is
    // intentionally not preserved, matching how the preview is drawn.
    let resized = img.resize_exact(
        config.output_size,
        config.output_size,
        image::imageops::FilterType::Triangle,
    );

    let rgb = resized.to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, config.jpeg_quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| StagingError::EncodeFailed(e.to_string()))?;

    Ok(StagedImage {
        data: buffer,
        width: config.output_size,
        height: config.output_size,
        mime_type: "image/jpeg".into(),
        file_name: file_name.to_string(),
    })
}

fn validate_format(raw_bytes: &[u8]) -> Result<ImageFormat, StagingError> {
    let format = image::guess_format(raw_bytes)
        .map_err(|_| StagingError::UnsupportedFormat("unrecognized".into()))?;

    if !ALLOWED_FORMATS.contains(&format) {
        return Err(StagingError::UnsupportedFormat(format!("{format:?}")));
    }

    Ok(format)
}

fn probe_dimensions(
    raw_bytes: &[u8],
    config: &StagingConfig,
) -> Result<(u32, u32), StagingError> {
    let reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| StagingError::DecodeFailed(e.to_string()))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| StagingError::DecodeFailed(e.to_string()))?;

    if width == 0 || height == 0 {
        return Err(StagingError::DecodeFailed(format!(
            "degenerate dimensions {width}x{height}"
        )));
    }

    if width > config.max_dimension || height > config.max_dimension {
        return Err(StagingError::DimensionsTooLarge {
            width,
            height,
            max: config.max_dimension,
        });
    }

    Ok((width, height))
}
