//! # batch-convert
//!
//! Convert a batch of images and PDFs to one target image format, isolating
//! per-file failures, and download the results as a single file or a zip.
//!
//! ## Why this crate?
//!
//! A conversion batch is only as good as its worst input. One corrupt TIFF
//! or an encrypted PDF should not cost the user the other forty files, and
//! a slow or crashing engine should not wedge the caller. Each batch
//! therefore runs in an isolated worker task that hands every record back:
//! converted if it could be, unchanged if it could not.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Upload    allow-list filter, preview URLs for displayable images
//!  ├─ 2. Store     ordered FileRecords owned by the Session
//!  ├─ 3. Convert   fresh worker per batch, engine init once, per-record isolation
//!  ├─ 4. Commit    store replaced in one step, Converted flag set, view → Export
//!  └─ 5. Export    one result directly, or converted_files.zip
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_convert::{upload, BatchConfig, BatchOrchestrator, DirectorySink, ObjectUrls, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(Arc::new(ObjectUrls::new()));
//!     session.add_files([upload::read_source("photo.png").await?])?;
//!
//!     let orchestrator = BatchOrchestrator::with_pdfium(BatchConfig::default());
//!     let summary = orchestrator.convert(&session, "webp").await?;
//!     eprintln!("{}/{} converted", summary.converted, summary.total);
//!
//!     session.export(&DirectorySink::new("out")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `batch-convert` binary (clap + anyhow + indicatif + tracing-subscriber + serde_json) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! batch-convert = { version = "0.1", default-features = false }
//! ```
//!
//! ## Output Formats
//!
//! | Token | Output | Notes |
//! |-------|--------|-------|
//! | `png`  | PNG  | lossless |
//! | `jpeg` | JPEG | alpha dropped; `jpg` accepted |
//! | `gif`  | GIF  | |
//! | `tiff` | TIFF | `tif` accepted |
//! | `webp` | WebP | lossless |
//! | `bmp`  | BMP  | |
//! | `avif` | –    | accepted, but the default engine has no encoder: records pass through |
//!
//! PDFs convert via their first page, rasterised with pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod handles;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod protocol;
pub mod record;
pub mod session;
pub mod store;
pub mod upload;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchConfig, BatchConfigBuilder, ENGINE_LIB_ENV};
pub use engine::{pdfium_engine_factory, ConversionEngine, EngineFactory, PdfiumEngine};
pub use error::{BatchError, EngineError, ExportError, RecordError, SessionError};
pub use export::{package, Artifact, DirectorySink, DownloadSink, MemorySink, ARCHIVE_NAME};
pub use handles::{HandleRegistry, ObjectUrl, ObjectUrls, ScopedObjectUrl};
pub use orchestrator::BatchOrchestrator;
pub use output::{BatchReport, BatchSummary, ExportReceipt};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use protocol::{ConversionRequest, ConversionResponse, WorkerFault};
pub use record::{FileRecord, ImageType, InputKind, RecordId, SourceFile};
pub use session::{BatchOutcome, BatchPhase, Session, View};
pub use store::FileStore;
