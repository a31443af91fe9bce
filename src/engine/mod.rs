//! The conversion engine boundary.
//!
//! A [`ConversionEngine`] is bytes-in, bytes-out: it is initialised once from
//! a library location, then asked to convert one payload at a time. The
//! worker only ever talks to the trait, so tests can script an engine and
//! embedders can plug in their own.
//!
//! ## Data Flow (default engine)
//!
//! ```text
//! Image bytes ──▶ encode::transcode ─────────────────────────▶ bytes
//! PDF bytes   ──▶ render::render_first_page ──▶ encode::encode_image ──▶ bytes
//!                 (pdfium, bound at init)
//! ```
//!
//! Both methods are blocking; the worker calls them from `spawn_blocking`.

pub mod encode;
pub mod render;

use crate::error::EngineError;
use crate::record::{ImageType, InputKind};
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// A conversion library loaded from a binary location.
pub trait ConversionEngine: Send + Sync {
    /// Load the engine's library. Called once per worker before any
    /// [`ConversionEngine::convert`].
    fn initialize(&self, binary_location: &Path) -> Result<(), EngineError>;

    /// Convert `input` to `format`.
    ///
    /// `Ok(None)` means the engine produced nothing for this input.
    fn convert(
        &self,
        kind: InputKind,
        input: &[u8],
        format: ImageType,
    ) -> Result<Option<Vec<u8>>, EngineError>;
}

/// Builds a fresh engine for each worker.
pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn ConversionEngine> + Send + Sync>;

/// Factory for the default [`PdfiumEngine`].
pub fn pdfium_engine_factory() -> EngineFactory {
    Arc::new(|| Arc::new(PdfiumEngine::new()) as Arc<dyn ConversionEngine>)
}

/// Default engine: `image` for raster inputs, pdfium for PDFs.
pub struct PdfiumEngine {
    pdfium: OnceLock<Pdfium>,
    max_rendered_pixels: u32,
}

impl PdfiumEngine {
    pub fn new() -> Self {
        Self {
            pdfium: OnceLock::new(),
            max_rendered_pixels: render::DEFAULT_MAX_RENDERED_PIXELS,
        }
    }

    /// Cap on the longest edge of a rasterised PDF page.
    pub fn with_max_rendered_pixels(mut self, px: u32) -> Self {
        self.max_rendered_pixels = px.max(16);
        self
    }
}

impl Default for PdfiumEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionEngine for PdfiumEngine {
    fn initialize(&self, binary_location: &Path) -> Result<(), EngineError> {
        if self.pdfium.get().is_some() {
            return Ok(());
        }
        let bindings =
            Pdfium::bind_to_library(binary_location).map_err(|e| EngineError::Bind {
                path: binary_location.to_path_buf(),
                reason: e.to_string(),
            })?;
        // Lost race means another thread bound first; either copy is fine.
        let _ = self.pdfium.set(Pdfium::new(bindings));
        info!("Engine bound to {}", binary_location.display());
        Ok(())
    }

    fn convert(
        &self,
        kind: InputKind,
        input: &[u8],
        format: ImageType,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let out = match kind {
            InputKind::Image(from) => {
                debug!("Transcoding {} → {}", from, format);
                encode::transcode(input, format)?
            }
            InputKind::Pdf => {
                let pdfium = self.pdfium.get().ok_or(EngineError::NotInitialised)?;
                let page = render::render_first_page(pdfium, input, self.max_rendered_pixels)?;
                encode::encode_image(&page, format)?
            }
        };
        Ok(Some(out))
    }
}
