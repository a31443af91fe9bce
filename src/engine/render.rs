//! PDF rasterisation: render the first page of an in-memory PDF via pdfium.
//!
//! The longest edge is capped rather than rendering at a fixed DPI: page
//! sizes vary wildly and an A0 poster would otherwise allocate hundreds of
//! megabytes of pixels.

use crate::error::EngineError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// Default cap on the longest rendered edge, in pixels.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 2000;

/// Rasterise page 1 of `bytes`.
///
/// Blocking; call from `spawn_blocking`.
pub fn render_first_page(
    pdfium: &Pdfium,
    bytes: &[u8],
    max_pixels: u32,
) -> Result<DynamicImage, EngineError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(EngineError::Pdf("missing %PDF header".into()));
    }

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| EngineError::Pdf(format!("load failed: {:?}", e)))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(EngineError::Pdf("document has no pages".into()));
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages
        .get(0)
        .map_err(|e| EngineError::Pdf(format!("page 1: {:?}", e)))?;

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| EngineError::Pdf(format!("render page 1: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());
    Ok(image)
}
