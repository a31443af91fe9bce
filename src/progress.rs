//! Progress-callback trait for per-record conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the worker processes each record.
//!
//! # Example
//!
//! ```rust
//! use batch_convert::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_record_converted(&self, index: usize, total: usize, name: &str, size: usize) {
//!         let done = self.converted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: #{index}/{total} {name} ({size} bytes)");
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { converted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion worker as it processes each record.
///
/// Records in a batch are converted concurrently, so the per-record methods
/// may be called from different threads and in any order. All methods have
/// default no-op implementations.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the engine is initialised and before any record.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a record is handed to the engine.
    ///
    /// `index` is the 0-based position in the batch.
    fn on_record_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a record converted successfully.
    ///
    /// `size` is the byte length of the result.
    fn on_record_converted(&self, index: usize, total: usize, name: &str, size: usize) {
        let _ = (index, total, name, size);
    }

    /// Called when a record failed and is passed through unchanged.
    fn on_record_passthrough(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every record has resolved.
    fn on_batch_complete(&self, total: usize, converted: usize) {
        let _ = (total, converted);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
