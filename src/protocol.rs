//! Message contract between the orchestrator and the conversion worker.
//!
//! The worker boundary is where per-record and batch-level failures are told
//! apart, so the response is a typed envelope rather than a bag of optional
//! fields:
//!
//! * [`ConversionResponse::Success`] — the batch ran. Every input record comes
//!   back at its original index, converted or passed through unchanged;
//!   `failures` explains the pass-throughs.
//! * [`ConversionResponse::Failure`] — the batch could not run (engine
//!   initialisation failed). No records come back.

use crate::error::RecordError;
use crate::record::{FileRecord, ImageType};
use std::path::PathBuf;

/// One batch of records to convert.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Records in store order; the response preserves this order.
    pub records: Vec<FileRecord>,
    /// Target format for every record.
    pub format: ImageType,
    /// Where the engine loads its library from.
    pub binary_location: PathBuf,
}

/// Batch-level fault reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerFault {
    /// The engine could not be initialised from `location`.
    EngineInit { location: PathBuf, detail: String },
}

impl std::fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerFault::EngineInit { location, detail } => {
                write!(f, "engine init from '{}' failed: {}", location.display(), detail)
            }
        }
    }
}

/// The worker's answer to a [`ConversionRequest`].
#[derive(Debug, Clone)]
pub enum ConversionResponse {
    Success {
        /// Exactly one record per request record, same order.
        converted_files: Vec<FileRecord>,
        /// Isolated per-record failures, ordered by index.
        failures: Vec<RecordError>,
    },
    Failure {
        error: WorkerFault,
    },
}

impl ConversionResponse {
    pub fn success(&self) -> bool {
        matches!(self, ConversionResponse::Success { .. })
    }

    /// Records carried by a successful response.
    pub fn converted_files(&self) -> Option<&[FileRecord]> {
        match self {
            ConversionResponse::Success {
                converted_files, ..
            } => Some(converted_files),
            ConversionResponse::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&WorkerFault> {
        match self {
            ConversionResponse::Success { .. } => None,
            ConversionResponse::Failure { error } => Some(error),
        }
    }
}
