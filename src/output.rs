//! Result types reported back to callers.

use crate::error::RecordError;
use crate::record::ImageType;
use serde::{Deserialize, Serialize};

/// Outcome of one successful batch.
///
/// A batch "succeeds" even when individual records were passed through;
/// `failures` lists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub format: ImageType,
    pub total: usize,
    pub converted: usize,
    pub passed_through: usize,
    pub failures: Vec<RecordError>,
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn all_converted(&self) -> bool {
        self.passed_through == 0
    }
}

/// What an export delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub file_name: String,
    pub mime: String,
    pub size_bytes: usize,
    /// Archive entry names, in order; empty for a direct download.
    pub entries: Vec<String>,
}

impl ExportReceipt {
    pub fn is_archive(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// Everything a CLI run produced, for `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub export: Option<ExportReceipt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serialises_with_lowercase_format() {
        let s = BatchSummary {
            format: ImageType::WebP,
            total: 3,
            converted: 2,
            passed_through: 1,
            failures: vec![RecordError::NoOutput {
                index: 2,
                name: "c.png".into(),
            }],
            duration_ms: 12,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"format\":\"webp\""), "got: {json}");
        assert!(!s.all_converted());
    }

    #[test]
    fn receipt_kind() {
        let direct = ExportReceipt {
            file_name: "a.webp".into(),
            mime: "image/webp".into(),
            size_bytes: 10,
            entries: vec![],
        };
        assert!(!direct.is_archive());
    }
}
