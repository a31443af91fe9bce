//! Session state: the store, the Converted flag and the batch phase.
//!
//! A [`Session`] is constructed explicitly with the [`HandleRegistry`] that
//! mints its preview URLs; there is no ambient global state. Its lifecycle:
//!
//! ```text
//! new ──▶ add_files / remove ──▶ convert (orchestrator) ──▶ export ──▶ reset ──▶ …
//!                                                                       drop = teardown
//! ```
//!
//! All mutation happens from the orchestrating task. The internal locks are
//! held only for the duration of a single store operation and never across
//! an `.await`.

use crate::error::{ExportError, SessionError};
use crate::export::{self, DownloadSink};
use crate::handles::HandleRegistry;
use crate::output::ExportReceipt;
use crate::record::{FileRecord, RecordId, SourceFile};
use crate::store::FileStore;
use crate::upload;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Where the orchestrator is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Converting,
}

/// How the most recent batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded,
    Failed,
}

/// Which step the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Upload,
    Export,
}

pub struct Session {
    handles: Arc<dyn HandleRegistry>,
    store: Mutex<FileStore>,
    converted: AtomicBool,
    converting: AtomicBool,
    last_outcome: Mutex<Option<BatchOutcome>>,
    view: Mutex<View>,
}

impl Session {
    pub fn new(handles: Arc<dyn HandleRegistry>) -> Self {
        Self {
            store: Mutex::new(FileStore::new(Arc::clone(&handles))),
            handles,
            converted: AtomicBool::new(false),
            converting: AtomicBool::new(false),
            last_outcome: Mutex::new(None),
            view: Mutex::new(View::Upload),
        }
    }

    pub fn handles(&self) -> &Arc<dyn HandleRegistry> {
        &self.handles
    }

    /// Snapshot of the records, in order.
    pub fn records(&self) -> Vec<FileRecord> {
        self.store().list().to_vec()
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }

    /// The Converted flag: true once the current batch has succeeded.
    pub fn is_converted(&self) -> bool {
        self.converted.load(Ordering::Acquire)
    }

    /// Uploads, removals and new batches are rejected while busy.
    pub fn is_busy(&self) -> bool {
        self.converting.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> BatchPhase {
        if self.is_busy() {
            BatchPhase::Converting
        } else {
            BatchPhase::Idle
        }
    }

    pub fn last_outcome(&self) -> Option<BatchOutcome> {
        *lock(&self.last_outcome)
    }

    pub fn view(&self) -> View {
        *lock(&self.view)
    }

    /// Add a selection of files. Types outside the allow-list are dropped
    /// silently. Returns how many were accepted.
    pub fn add_files(
        &self,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        let records: Vec<FileRecord> = upload::filter_allowed(files)
            .into_iter()
            .map(|src| self.new_record(src))
            .collect();
        let accepted = records.len();
        self.store().append(records);
        debug!("Accepted {} files", accepted);
        Ok(accepted)
    }

    /// Remove one record, releasing its preview. Returns whether it existed.
    pub fn remove(&self, id: RecordId) -> Result<bool, SessionError> {
        self.ensure_idle()?;
        Ok(!self.store().remove_where(|r| r.id() == id).is_empty())
    }

    /// Remove every record, releasing their previews.
    pub fn remove_all(&self) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        Ok(self.store().remove_where(|_| true).len())
    }

    /// Start a new upload session: clear records, Converted flag and view.
    pub fn reset(&self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.store().teardown();
        self.converted.store(false, Ordering::Release);
        *lock(&self.last_outcome) = None;
        *lock(&self.view) = View::Upload;
        info!("Session reset");
        Ok(())
    }

    /// Package the converted results and hand them to `sink`.
    ///
    /// A no-op (`Ok(None)`) until a batch has succeeded, or when there is
    /// nothing to package.
    pub async fn export<S: DownloadSink>(
        &self,
        sink: &S,
    ) -> Result<Option<ExportReceipt>, ExportError> {
        export::export_results(self, sink).await
    }

    /// Enter `Converting`. `None` if a batch is already in flight.
    pub(crate) fn begin_batch(&self) -> Option<BatchGuard<'_>> {
        self.converting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        debug!("Phase: Idle → Converting");
        Some(BatchGuard {
            session: self,
            settled: false,
        })
    }

    fn new_record(&self, src: SourceFile) -> FileRecord {
        let previewable = src.kind().is_some_and(|k| k.is_previewable());
        let preview = previewable.then(|| self.handles.create(src.mime(), Arc::clone(src.bytes())));
        let record = FileRecord::new(src);
        match preview {
            Some(url) => record.with_preview(url),
            None => record,
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn store(&self) -> MutexGuard<'_, FileStore> {
        lock(&self.store)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Holds the session in `Converting`; returns it to `Idle` when settled or dropped.
///
/// Dropping without settling (the orchestrating future was cancelled) counts
/// as a failed batch.
pub(crate) struct BatchGuard<'a> {
    session: &'a Session,
    settled: bool,
}

impl BatchGuard<'_> {
    /// `Converting → Succeeded`: commit the records and move to Export.
    pub(crate) fn succeed(mut self, records: Vec<FileRecord>) {
        let s = self.session;
        s.store().replace_all(records);
        s.converted.store(true, Ordering::Release);
        *lock(&s.view) = View::Export;
        self.settle(Some(BatchOutcome::Succeeded));
    }

    /// `Converting → Failed`: leave the store as it was.
    pub(crate) fn fail(mut self) {
        self.settle(Some(BatchOutcome::Failed));
    }

    /// Back to `Idle` without recording an outcome (precondition unmet).
    pub(crate) fn abandon(mut self) {
        self.settle(None);
    }

    fn settle(&mut self, outcome: Option<BatchOutcome>) {
        if self.settled {
            return;
        }
        self.settled = true;
        if let Some(o) = outcome {
            *lock(&self.session.last_outcome) = Some(o);
            debug!("Phase: Converting → {:?} → Idle", o);
        }
        self.session.converting.store(false, Ordering::Release);
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.settle(Some(BatchOutcome::Failed));
    }
}
