//! Raster encoding: decoded image → target format bytes.
//!
//! Encoders in `image` accept a narrower set of pixel layouts than decoders
//! produce, so each target gets the layout it can write: JPEG has no alpha
//! channel, GIF/WebP/BMP want 8-bit RGBA. PNG and TIFF take the decoded
//! layout as-is, 16-bit depth included.

use crate::error::EngineError;
use crate::record::ImageType;
use image::{DynamicImage, ImageFormat};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Decode `input` (format sniffed from its bytes) and re-encode as `format`.
pub fn transcode(input: &[u8], format: ImageType) -> Result<Vec<u8>, EngineError> {
    let img = image::load_from_memory(input).map_err(|e| EngineError::Decode(e.to_string()))?;
    encode_image(&img, format)
}

/// Encode a decoded image as `format`.
pub fn encode_image(img: &DynamicImage, format: ImageType) -> Result<Vec<u8>, EngineError> {
    let target =
        image_format(format).ok_or_else(|| EngineError::UnsupportedFormat(format.token().into()))?;

    let prepared: Cow<'_, DynamicImage> = match format {
        ImageType::Jpeg => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
        ImageType::Gif | ImageType::WebP | ImageType::Bmp => {
            Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8()))
        }
        _ => Cow::Borrowed(img),
    };

    let mut buf = Vec::new();
    prepared
        .write_to(&mut Cursor::new(&mut buf), target)
        .map_err(|e| EngineError::Encode {
            format: format.token().into(),
            detail: e.to_string(),
        })?;

    debug!(
        "Encoded {}x{} → {} ({} bytes)",
        img.width(),
        img.height(),
        format,
        buf.len()
    );
    Ok(buf)
}

/// Encoder for `format`, if this build has one.
fn image_format(format: ImageType) -> Option<ImageFormat> {
    match format {
        ImageType::Png => Some(ImageFormat::Png),
        ImageType::Jpeg => Some(ImageFormat::Jpeg),
        ImageType::Gif => Some(ImageFormat::Gif),
        ImageType::Tiff => Some(ImageFormat::Tiff),
        ImageType::WebP => Some(ImageFormat::WebP),
        ImageType::Bmp => Some(ImageFormat::Bmp),
        // No AVIF encoder is compiled in.
        ImageType::Avif => None,
    }
}
