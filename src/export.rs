//! Packaging converted results for download.
//!
//! A single-record session downloads its result directly. Anything larger is
//! bundled into one zip archive named [`ARCHIVE_NAME`], containing every record
//! that carries a result, in store order. Records without a result are left
//! out. Exporting never touches the store, so it can be repeated.
//!
//! Delivery goes through a [`DownloadSink`]. The artifact is exposed under a
//! temporary object URL for the duration of the hand-off and revoked right
//! after, whether delivery succeeded or not.

use crate::error::ExportError;
use crate::handles::{ObjectUrl, ScopedObjectUrl};
use crate::output::ExportReceipt;
use crate::record::FileRecord;
use crate::session::Session;
use std::collections::HashMap;
use std::future::Future;
use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name of the multi-file download.
pub const ARCHIVE_NAME: &str = "converted_files.zip";

const ARCHIVE_MIME: &str = "application/zip";

/// A packaged download, ready for delivery.
#[derive(Clone)]
pub struct Artifact {
    pub file_name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
    /// Archive entry names in order; empty for a direct download.
    pub entries: Vec<String>,
}

impl Artifact {
    pub fn is_archive(&self) -> bool {
        !self.entries.is_empty()
    }

    fn receipt(&self) -> ExportReceipt {
        ExportReceipt {
            file_name: self.file_name.clone(),
            mime: self.mime.clone(),
            size_bytes: self.bytes.len(),
            entries: self.entries.clone(),
        }
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("entries", &self.entries)
            .finish()
    }
}

/// Package `records` into a downloadable artifact.
///
/// Returns `Ok(None)` when there is nothing to download: an empty list, a
/// lone record without a result, or a list where no record has a result.
pub fn package(records: &[FileRecord]) -> Result<Option<Artifact>, ExportError> {
    match records {
        [] => Ok(None),
        [only] => Ok(only.result().map(|r| Artifact {
            file_name: r.name().to_string(),
            mime: r.mime().to_string(),
            bytes: Arc::clone(r.bytes()),
            entries: Vec::new(),
        })),
        many => build_archive(many),
    }
}

fn build_archive(records: &[FileRecord]) -> Result<Option<Artifact>, ExportError> {
    let results: Vec<_> = records.iter().filter_map(FileRecord::result).collect();
    if results.is_empty() {
        return Ok(None);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut entries = Vec::with_capacity(results.len());

    for result in results {
        let entry = unique_entry_name(&mut seen, result.name());
        if !is_plain_file_name(&entry) {
            return Err(ExportError::UnsafeName(entry));
        }
        zip.start_file(entry.as_str(), options)
            .map_err(|e| ExportError::Archive(format!("entry '{entry}': {e}")))?;
        zip.write_all(result.bytes())
            .map_err(|e| ExportError::Archive(format!("entry '{entry}': {e}")))?;
        entries.push(entry);
    }

    let bytes = zip
        .finish()
        .map_err(|e| ExportError::Archive(format!("finalise: {e}")))?
        .into_inner();
    debug!("Archived {} entries into {} bytes", entries.len(), bytes.len());

    Ok(Some(Artifact {
        file_name: ARCHIVE_NAME.to_string(),
        mime: ARCHIVE_MIME.to_string(),
        bytes: bytes.into(),
        entries,
    }))
}

/// Zip entries must be unique; later duplicates become `name (1).ext`, `name (2).ext`, …
fn unique_entry_name(seen: &mut HashMap<String, usize>, name: &str) -> String {
    let count = seen.entry(name.to_string()).or_insert(0);
    let n = *count;
    *count += 1;
    if n == 0 {
        return name.to_string();
    }
    let candidate = match name.rfind('.') {
        Some(pos) if pos > 0 => format!("{} ({n}){}", &name[..pos], &name[pos..]),
        _ => format!("{name} ({n})"),
    };
    // The suffixed name could itself collide with a real file name.
    if seen.contains_key(&candidate) {
        return unique_entry_name(seen, &candidate);
    }
    seen.insert(candidate.clone(), 1);
    candidate
}

/// A single normal path component with no separator of either kind.
fn is_plain_file_name(name: &str) -> bool {
    if name.contains(|c: char| c == '/' || c == '\\') {
        return false;
    }
    let mut parts = Path::new(name).components();
    matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None))
}

/// Where a finished download goes.
pub trait DownloadSink: Send + Sync {
    /// Deliver `artifact`, currently reachable at `url`.
    fn deliver(
        &self,
        url: &ObjectUrl,
        artifact: &Artifact,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;
}

/// Writes each download into a directory.
///
/// Files are written to a temporary name and renamed into place, so a reader
/// never sees a partial file.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        self.dir.join(&artifact.file_name)
    }
}

impl DownloadSink for DirectorySink {
    async fn deliver(&self, url: &ObjectUrl, artifact: &Artifact) -> Result<(), ExportError> {
        if !is_plain_file_name(&artifact.file_name) {
            return Err(ExportError::UnsafeName(artifact.file_name.clone()));
        }
        let path = self.path_for(artifact);
        let write_err = |source: std::io::Error| ExportError::Write {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;

        let mut tmp_name = artifact.file_name.clone();
        tmp_name.push_str(".part");
        let tmp_path = self.dir.join(tmp_name);
        tokio::fs::write(&tmp_path, &artifact.bytes[..])
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(write_err)?;

        info!("Saved {} → {}", url, path.display());
        Ok(())
    }
}

/// Collects downloads in memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    pub fn delivered(&self) -> Vec<Artifact> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl DownloadSink for MemorySink {
    async fn deliver(&self, _url: &ObjectUrl, artifact: &Artifact) -> Result<(), ExportError> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(artifact.clone());
        Ok(())
    }
}

/// Package the session's results and hand them to `sink`.
///
/// Gated on the Converted flag: before a batch has succeeded this does
/// nothing and returns `Ok(None)`.
pub async fn export_results<S: DownloadSink>(
    session: &Session,
    sink: &S,
) -> Result<Option<ExportReceipt>, ExportError> {
    if !session.is_converted() {
        debug!("Export ignored: nothing converted yet");
        return Ok(None);
    }
    let Some(artifact) = package(&session.records())? else {
        debug!("Export ignored: no results to package");
        return Ok(None);
    };

    let scoped = ScopedObjectUrl::new(
        session.handles().as_ref(),
        &artifact.mime,
        Arc::clone(&artifact.bytes),
    );
    sink.deliver(scoped.url(), &artifact).await?;
    drop(scoped);

    info!(
        "Exported '{}' ({} bytes{})",
        artifact.file_name,
        artifact.bytes.len(),
        if artifact.is_archive() {
            format!(", {} entries", artifact.entries.len())
        } else {
            String::new()
        }
    );
    Ok(Some(artifact.receipt()))
}
