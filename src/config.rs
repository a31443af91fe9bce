//! Configuration for conversion batches.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`].

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Environment variable naming an existing pdfium shared library.
pub const ENGINE_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Configuration for a conversion batch.
///
/// # Example
/// ```rust
/// use batch_convert::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .binary_location("/opt/pdfium/lib/libpdfium.so")
///     .concurrency(8)
///     .batch_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Location of the engine's loadable library (libpdfium).
    ///
    /// Default: `$PDFIUM_LIB_PATH`, else the platform library name in the
    /// current directory.
    pub binary_location: PathBuf,

    /// Records converted at once inside the worker. Default: 4.
    ///
    /// Each conversion runs on the blocking pool; more than the number of
    /// cores buys nothing.
    pub concurrency: usize,

    /// Upper bound on one whole batch, in seconds. Default: 300.
    pub batch_timeout_secs: u64,

    /// Optional per-record progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            binary_location: default_binary_location(),
            concurrency: 4,
            batch_timeout_secs: 300,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("binary_location", &self.binary_location)
            .field("concurrency", &self.concurrency)
            .field("batch_timeout_secs", &self.batch_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn binary_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.binary_location = path.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn batch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.batch_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.batch_timeout_secs == 0 {
            return Err(BatchError::InvalidConfig(
                "Batch timeout must be ≥ 1 second".into(),
            ));
        }
        if c.binary_location.as_os_str().is_empty() {
            return Err(BatchError::InvalidConfig(
                "Engine binary location must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// `$PDFIUM_LIB_PATH` if set, else `./<platform library name>`.
pub fn default_binary_location() -> PathBuf {
    match std::env::var(ENGINE_LIB_ENV) {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(".").join(platform_library_name()),
    }
}

/// File name of the pdfium shared library on this platform.
pub fn platform_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "pdfium.dll"
    } else if cfg!(target_os = "macos") {
        "libpdfium.dylib"
    } else {
        "libpdfium.so"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = BatchConfig::builder().build().unwrap();
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.batch_timeout_secs, 300);
        assert!(c.progress_callback.is_none());
        assert!(!c.binary_location.as_os_str().is_empty());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = BatchConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = BatchConfig::builder().batch_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn empty_location_rejected() {
        assert!(BatchConfig::builder().binary_location("").build().is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let c = BatchConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn BatchProgressCallback>"));
    }

    #[test]
    fn platform_library_name_is_pdfium() {
        assert!(platform_library_name().contains("pdfium"));
    }
}
