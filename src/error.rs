//! Error types for the batch-convert library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] — **Fatal**: the batch cannot complete at all (engine
//!   failed to initialise, worker vanished, timeout). Returned as
//!   `Err(BatchError)` from [`crate::orchestrator::BatchOrchestrator::convert`];
//!   the session is left exactly as it was before the attempt.
//!
//! * [`RecordError`] — **Non-fatal**: a single file failed to convert (corrupt
//!   bytes, unsupported type, engine panic) but every other file is fine. The
//!   record is passed through unchanged and the error is reported in
//!   [`crate::output::BatchSummary::failures`].
//!
//! [`EngineError`] is what a [`crate::engine::ConversionEngine`] returns; the
//! worker decides whether it becomes fatal (during initialisation) or
//! non-fatal (during a per-record conversion).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by a conversion batch.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Trigger preconditions ─────────────────────────────────────────────
    /// A batch is already in flight; this trigger was ignored.
    #[error("A conversion is already in progress")]
    AlreadyConverting,

    /// There is nothing to convert.
    #[error("No files selected for conversion")]
    EmptySelection,

    /// No output format was chosen.
    #[error("No output format selected")]
    MissingFormat,

    /// The output format token is not one we know.
    #[error("Unsupported output format '{token}'\nSupported: png, jpeg, gif, tiff, webp, bmp, avif")]
    UnsupportedFormat { token: String },

    // ── Worker / engine ───────────────────────────────────────────────────
    /// The conversion engine could not be initialised.
    #[error(
        "Failed to initialise conversion engine from '{location}': {detail}\n\
Set PDFIUM_LIB_PATH or pass --engine-lib to point at a libpdfium build."
    )]
    EngineInit { location: PathBuf, detail: String },

    /// The worker went away before answering (task panicked or channel closed).
    #[error("Conversion worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The worker answered with the wrong number of records.
    #[error("Worker returned {got} records for a batch of {expected}")]
    ProtocolMismatch { expected: usize, got: usize },

    /// The whole batch exceeded the configured timeout.
    #[error("Batch timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single record.
///
/// `index` is the record's 0-based position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// Declared MIME type has no engine entry point.
    #[error("#{index} '{name}': unsupported input type '{mime}'")]
    UnsupportedInput {
        index: usize,
        name: String,
        mime: String,
    },

    /// The engine reported an error.
    #[error("#{index} '{name}': conversion failed: {detail}")]
    ConversionFailed {
        index: usize,
        name: String,
        detail: String,
    },

    /// The engine finished but produced nothing.
    #[error("#{index} '{name}': engine produced no output")]
    NoOutput { index: usize, name: String },

    /// The engine panicked while converting this record.
    #[error("#{index} '{name}': engine panicked: {detail}")]
    Panicked {
        index: usize,
        name: String,
        detail: String,
    },
}

impl RecordError {
    /// Position of the failing record in its batch.
    pub fn index(&self) -> usize {
        match self {
            RecordError::UnsupportedInput { index, .. }
            | RecordError::ConversionFailed { index, .. }
            | RecordError::NoOutput { index, .. }
            | RecordError::Panicked { index, .. } => *index,
        }
    }
}

/// Errors raised by a conversion engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Could not bind to the engine's shared library.
    #[error("Failed to bind engine library '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// Engine used before `initialize` succeeded.
    #[error("Engine is not initialised")]
    NotInitialised,

    /// Input bytes could not be decoded.
    #[error("Unable to decode input: {0}")]
    Decode(String),

    /// Decoded image could not be written in the target format.
    #[error("Unable to encode to {format}: {detail}")]
    Encode { format: String, detail: String },

    /// Target format has no encoder in this engine.
    #[error("Engine cannot produce '{0}' output")]
    UnsupportedFormat(String),

    /// PDF-specific failure (load, empty document, rasterisation).
    #[error("PDF error: {0}")]
    Pdf(String),
}

/// Errors raised while packaging or delivering an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Building the zip archive failed.
    #[error("Failed to build archive: {0}")]
    Archive(String),

    /// A download or entry name is not a bare file name.
    #[error("Refusing to write '{0}': not a plain file name")]
    UnsafeName(String),

    /// Writing the artifact to its destination failed.
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from session-level mutations (upload, removal).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Uploads and removals are disabled while a batch is converting.
    #[error("Session is busy converting; try again when the batch completes")]
    Busy,

    /// Reading an input file failed.
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
