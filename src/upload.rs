//! Upload surface: the MIME allow-list and reading files from disk.
//!
//! Anything outside [`ALLOWED_MIME_TYPES`] is dropped from a selection
//! without an error. Files read from disk get their declared type from the
//! extension, the way a browser labels a picked file.

use crate::error::SessionError;
use crate::record::SourceFile;
use std::path::Path;
use tracing::debug;

/// Declared MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: [&str; 8] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/tiff",
    "image/webp",
    "image/bmp",
    "image/avif",
    "application/pdf",
];

pub fn is_allowed(mime: &str) -> bool {
    ALLOWED_MIME_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(mime.trim()))
}

/// Keep only allow-listed files, preserving order.
pub fn filter_allowed(files: impl IntoIterator<Item = SourceFile>) -> Vec<SourceFile> {
    files
        .into_iter()
        .filter(|f| {
            let ok = is_allowed(f.mime());
            if !ok {
                debug!("Dropping '{}' ({}): not an accepted type", f.name(), f.mime());
            }
            ok
        })
        .collect()
}

/// Read `path` into a [`SourceFile`], guessing its MIME type from the extension.
pub async fn read_source(path: impl AsRef<Path>) -> Result<SourceFile, SessionError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| SessionError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!("Read '{}' ({}, {} bytes)", name, mime, bytes.len());
    Ok(SourceFile::new(name, mime.essence_str(), bytes))
}
