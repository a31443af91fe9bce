//! The batch orchestrator: one conversion batch from trigger to commit.
//!
//! ```text
//!  Idle ──convert()──▶ Converting ──Success──▶ Succeeded ──▶ Idle   (store replaced, view = Export)
//!                          │
//!                          └──Failure / timeout / worker lost──▶ Failed ──▶ Idle   (store untouched)
//! ```
//!
//! Each batch gets a fresh [`ConversionWorker`] which is torn down as soon as
//! the response arrives. Triggers that arrive while a batch is in flight are
//! rejected with [`BatchError::AlreadyConverting`]; only one worker exists per
//! session at any time.

use crate::config::BatchConfig;
use crate::engine::{pdfium_engine_factory, EngineFactory};
use crate::error::BatchError;
use crate::output::BatchSummary;
use crate::protocol::{ConversionRequest, ConversionResponse, WorkerFault};
use crate::record::{FileRecord, ImageType};
use crate::session::Session;
use crate::worker::ConversionWorker;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct BatchOrchestrator {
    config: BatchConfig,
    engine_factory: EngineFactory,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig, engine_factory: EngineFactory) -> Self {
        Self {
            config,
            engine_factory,
        }
    }

    /// Orchestrator backed by the default pdfium engine.
    pub fn with_pdfium(config: BatchConfig) -> Self {
        Self::new(config, pdfium_engine_factory())
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Convert every record in `session` to the format named by `format`.
    ///
    /// On success the store is replaced in one step with the converted
    /// records, the Converted flag is set and the view moves to Export.
    /// Records the engine could not handle come back unchanged and are listed
    /// in [`BatchSummary::failures`].
    ///
    /// On error nothing in the session changes except that it returns to
    /// idle.
    pub async fn convert(&self, session: &Session, format: &str) -> Result<BatchSummary, BatchError> {
        if session.is_busy() {
            warn!("Convert ignored: a batch is already in flight");
            return Err(BatchError::AlreadyConverting);
        }
        let format = parse_format(format)?;

        let guard = session.begin_batch().ok_or(BatchError::AlreadyConverting)?;
        let records = session.records();
        if records.is_empty() {
            guard.abandon();
            return Err(BatchError::EmptySelection);
        }

        let start = Instant::now();
        info!("Batch of {} records → {}", records.len(), format);

        match self.run_batch(records, format).await {
            Ok((converted, summary)) => {
                let summary = BatchSummary {
                    duration_ms: start.elapsed().as_millis() as u64,
                    ..summary
                };
                guard.succeed(converted);
                info!(
                    "Batch succeeded: {}/{} converted in {}ms",
                    summary.converted, summary.total, summary.duration_ms
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Batch failed: {}", e);
                guard.fail();
                Err(e)
            }
        }
    }

    async fn run_batch(
        &self,
        records: Vec<FileRecord>,
        format: ImageType,
    ) -> Result<(Vec<FileRecord>, BatchSummary), BatchError> {
        let expected = records.len();
        let worker = ConversionWorker::spawn(
            (self.engine_factory)(),
            self.config.concurrency,
            self.config.progress_callback.clone(),
        );
        let request = ConversionRequest {
            records,
            format,
            binary_location: self.config.binary_location.clone(),
        };

        let secs = self.config.batch_timeout_secs;
        let response = tokio::time::timeout(Duration::from_secs(secs), worker.submit(request)).await;
        worker.terminate();
        let response = response.map_err(|_| BatchError::Timeout { secs })??;

        reconcile(response, expected, format)
    }
}

fn parse_format(token: &str) -> Result<ImageType, BatchError> {
    if token.trim().is_empty() {
        return Err(BatchError::MissingFormat);
    }
    ImageType::from_token(token).ok_or_else(|| BatchError::UnsupportedFormat {
        token: token.to_string(),
    })
}

fn reconcile(
    response: ConversionResponse,
    expected: usize,
    format: ImageType,
) -> Result<(Vec<FileRecord>, BatchSummary), BatchError> {
    match response {
        ConversionResponse::Failure {
            error: WorkerFault::EngineInit { location, detail },
        } => Err(BatchError::EngineInit { location, detail }),
        ConversionResponse::Success {
            converted_files,
            failures,
        } => {
            if converted_files.len() != expected {
                return Err(BatchError::ProtocolMismatch {
                    expected,
                    got: converted_files.len(),
                });
            }
            let converted = converted_files.iter().filter(|r| r.is_converted()).count();
            debug!("Reconciled {} records ({} converted)", expected, converted);
            let summary = BatchSummary {
                format,
                total: expected,
                converted,
                passed_through: expected - converted,
                failures,
                duration_ms: 0,
            };
            Ok((converted_files, summary))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceFile;
    use std::path::PathBuf;

    fn rec(name: &str) -> FileRecord {
        FileRecord::new(SourceFile::new(name, "image/png", vec![1u8]))
    }

    #[test]
    fn format_tokens_are_validated() {
        assert!(matches!(parse_format(""), Err(BatchError::MissingFormat)));
        assert!(matches!(parse_format("  "), Err(BatchError::MissingFormat)));
        assert!(matches!(
            parse_format("xcf"),
            Err(BatchError::UnsupportedFormat { .. })
        ));
        assert_eq!(parse_format("WebP").unwrap(), ImageType::WebP);
    }

    #[test]
    fn reconcile_rejects_short_responses() {
        let resp = ConversionResponse::Success {
            converted_files: vec![rec("a.png")],
            failures: vec![],
        };
        let err = reconcile(resp, 2, ImageType::Png).unwrap_err();
        assert!(matches!(
            err,
            BatchError::ProtocolMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn reconcile_maps_engine_fault() {
        let resp = ConversionResponse::Failure {
            error: WorkerFault::EngineInit {
                location: PathBuf::from("/lib/libpdfium.so"),
                detail: "missing".into(),
            },
        };
        assert!(matches!(
            reconcile(resp, 1, ImageType::Png),
            Err(BatchError::EngineInit { .. })
        ));
    }

    #[test]
    fn reconcile_counts_conversions() {
        let a = rec("a.png");
        let b = rec("b.png").converted(ImageType::Gif, vec![1]);
        let resp = ConversionResponse::Success {
            converted_files: vec![a, b],
            failures: vec![],
        };
        let (records, summary) = reconcile(resp, 2, ImageType::Gif).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.passed_through, 1);
        assert_eq!(summary.format, ImageType::Gif);
    }
}
