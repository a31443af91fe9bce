//! The per-file entity model.
//!
//! A [`FileRecord`] follows one uploaded file from selection to export:
//!
//! ```text
//! SourceFile ──▶ FileRecord { preview? } ──▶ FileRecord { result: Some(..) }
//!  (upload)        (store)                    (after a successful batch)
//! ```
//!
//! Records are cheap to clone: payloads live behind `Arc<[u8]>`, so handing a
//! copy of the whole collection to the worker costs a refcount per file.

use crate::handles::ObjectUrl;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    fn next() -> Self {
        RecordId(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The image types this crate knows how to read or write.
///
/// Doubles as the output-format token set: a batch converts every record to
/// one `ImageType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
    Tiff,
    WebP,
    Bmp,
    Avif,
}

impl ImageType {
    pub const ALL: [ImageType; 7] = [
        ImageType::Png,
        ImageType::Jpeg,
        ImageType::Gif,
        ImageType::Tiff,
        ImageType::WebP,
        ImageType::Bmp,
        ImageType::Avif,
    ];

    /// Parse a user-supplied format token (`"webp"`, `"JPG"`, …).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ImageType::Png),
            "jpeg" | "jpg" => Some(ImageType::Jpeg),
            "gif" => Some(ImageType::Gif),
            "tiff" | "tif" => Some(ImageType::Tiff),
            "webp" => Some(ImageType::WebP),
            "bmp" => Some(ImageType::Bmp),
            "avif" => Some(ImageType::Avif),
            _ => None,
        }
    }

    /// Canonical lowercase token, also used as the result file extension.
    pub fn token(self) -> &'static str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpeg",
            ImageType::Gif => "gif",
            ImageType::Tiff => "tiff",
            ImageType::WebP => "webp",
            ImageType::Bmp => "bmp",
            ImageType::Avif => "avif",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Gif => "image/gif",
            ImageType::Tiff => "image/tiff",
            ImageType::WebP => "image/webp",
            ImageType::Bmp => "image/bmp",
            ImageType::Avif => "image/avif",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Engine entry point selected from a record's declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Image(ImageType),
    Pdf,
}

impl InputKind {
    /// Classify a declared MIME type. Only allow-listed types map to a kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime == "application/pdf" {
            return Some(InputKind::Pdf);
        }
        let kind = match mime.strip_prefix("image/")? {
            "png" => ImageType::Png,
            "jpeg" => ImageType::Jpeg,
            "gif" => ImageType::Gif,
            "tiff" => ImageType::Tiff,
            "webp" => ImageType::WebP,
            "bmp" => ImageType::Bmp,
            "avif" => ImageType::Avif,
            _ => return None,
        };
        Some(InputKind::Image(kind))
    }

    /// Whether a preview thumbnail can be shown for this kind.
    ///
    /// PDFs have no inline preview and TIFF is not displayable.
    pub fn is_previewable(self) -> bool {
        matches!(self, InputKind::Image(t) if t != ImageType::Tiff)
    }
}

/// Immutable raw upload: bytes + name + declared MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn kind(&self) -> Option<InputKind> {
        InputKind::from_mime(&self.mime)
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Output of a successful conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionResult {
    name: String,
    format: ImageType,
    bytes: Arc<[u8]>,
}

impl ConversionResult {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> ImageType {
        self.format
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }
}

impl fmt::Debug for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionResult")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// One uploaded file and its conversion outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    id: RecordId,
    source: SourceFile,
    preview: Option<ObjectUrl>,
    result: Option<ConversionResult>,
}

impl FileRecord {
    pub fn new(source: SourceFile) -> Self {
        Self {
            id: RecordId::next(),
            source,
            preview: None,
            result: None,
        }
    }

    pub fn with_preview(mut self, preview: ObjectUrl) -> Self {
        self.preview = Some(preview);
        self
    }

    /// A copy of this record carrying a successful result.
    ///
    /// The id and preview are kept so the store can reconcile by position
    /// without losing handle ownership.
    pub fn converted(&self, format: ImageType, bytes: Vec<u8>) -> Self {
        Self {
            result: Some(ConversionResult {
                name: result_name_for(self.source.name(), format),
                format,
                bytes: bytes.into(),
            }),
            ..self.clone()
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn preview(&self) -> Option<&ObjectUrl> {
        self.preview.as_ref()
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        self.result.as_ref()
    }

    pub fn result_blob(&self) -> Option<&Arc<[u8]>> {
        self.result.as_ref().map(|r| r.bytes())
    }

    pub fn result_name(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.name())
    }

    pub fn is_converted(&self) -> bool {
        self.result.is_some()
    }

    pub(crate) fn take_preview(&mut self) -> Option<ObjectUrl> {
        self.preview.take()
    }
}

/// Replace the last extension of `name` with the format token.
///
/// Only a final `.ext` segment counts as an extension: `a.tar.gz` becomes
/// `a.tar.webp`, `README` becomes `README.webp`. Directory parts (either
/// separator) are dropped, so the result is always a bare file name.
pub fn result_name_for(name: &str, format: ImageType) -> String {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(name);
    let base = match base {
        "" | "." | ".." => "file",
        b => b,
    };
    let stem = match base.rfind('.') {
        Some(pos) if pos + 1 < base.len() => &base[..pos],
        _ => base,
    };
    format!("{stem}.{}", format.token())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_name_replaces_last_extension() {
        assert_eq!(result_name_for("photo.png", ImageType::WebP), "photo.webp");
        assert_eq!(result_name_for("a.tar.gz", ImageType::Png), "a.tar.png");
        assert_eq!(result_name_for("README", ImageType::Gif), "README.gif");
        assert_eq!(result_name_for("scan.PDF", ImageType::Jpeg), "scan.jpeg");
        assert_eq!(result_name_for("odd.", ImageType::Bmp), "odd..bmp");
    }

    #[test]
    fn result_name_drops_directory_parts() {
        assert_eq!(result_name_for("../escaped.png", ImageType::WebP), "escaped.webp");
        assert_eq!(result_name_for("/abs/x.png", ImageType::WebP), "x.webp");
        assert_eq!(result_name_for("..\\..\\win.bmp", ImageType::Png), "win.png");
        assert_eq!(result_name_for("dir.v2/photo", ImageType::Gif), "photo.gif");
        assert_eq!(result_name_for("..", ImageType::Png), "file.png");
        assert_eq!(result_name_for("a/", ImageType::Png), "file.png");
    }

    #[test]
    fn format_tokens() {
        assert_eq!(ImageType::from_token("WEBP"), Some(ImageType::WebP));
        assert_eq!(ImageType::from_token("jpg"), Some(ImageType::Jpeg));
        assert_eq!(ImageType::from_token(" png "), Some(ImageType::Png));
        assert_eq!(ImageType::from_token("xcf"), None);
        assert_eq!(ImageType::from_token(""), None);
        for t in ImageType::ALL {
            assert_eq!(ImageType::from_token(t.token()), Some(t));
            assert!(t.mime().ends_with(t.token()));
        }
    }

    #[test]
    fn input_kind_dispatch_is_closed() {
        assert_eq!(InputKind::from_mime("application/pdf"), Some(InputKind::Pdf));
        assert_eq!(
            InputKind::from_mime("image/png"),
            Some(InputKind::Image(ImageType::Png))
        );
        assert_eq!(InputKind::from_mime("IMAGE/JPEG"), Some(InputKind::Image(ImageType::Jpeg)));
        assert_eq!(InputKind::from_mime("image/svg+xml"), None);
        assert_eq!(InputKind::from_mime("text/plain"), None);
        assert_eq!(InputKind::from_mime(""), None);
    }

    #[test]
    fn previewability() {
        assert!(InputKind::Image(ImageType::Png).is_previewable());
        assert!(InputKind::Image(ImageType::Avif).is_previewable());
        assert!(!InputKind::Image(ImageType::Tiff).is_previewable());
        assert!(!InputKind::Pdf.is_previewable());
    }

    #[test]
    fn converted_keeps_identity() {
        let rec = FileRecord::new(SourceFile::new("cat.png", "image/png", vec![1u8, 2, 3]));
        let out = rec.converted(ImageType::WebP, vec![9, 9]);
        assert_eq!(out.id(), rec.id());
        assert_eq!(out.source(), rec.source());
        assert_eq!(out.result_name(), Some("cat.webp"));
        assert_eq!(out.result_blob().map(|b| b.len()), Some(2));
        assert_eq!(out.result().map(|r| r.mime()), Some("image/webp"));
        assert!(!rec.is_converted());
    }

    #[test]
    fn record_ids_are_unique() {
        let a = FileRecord::new(SourceFile::new("a", "image/png", Vec::<u8>::new()));
        let b = FileRecord::new(SourceFile::new("a", "image/png", Vec::<u8>::new()));
        assert_ne!(a.id(), b.id());
    }
}
