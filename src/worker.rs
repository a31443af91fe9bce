//! The isolated conversion worker.
//!
//! One [`ConversionWorker`] is spawned per batch as its own tokio task. It
//! owns a single engine instance and talks to the orchestrator only through
//! messages: requests in over an `mpsc` channel, each answered on its own
//! `oneshot`. Records cross the boundary by value; the worker never sees the
//! store.
//!
//! ## Failure isolation
//!
//! Each record is converted on the blocking pool and every way it can go
//! wrong (engine error, empty output, unknown input type, panic) is caught at
//! that record. The failing record comes back unchanged and the batch
//! carries on. Only engine initialisation can fail a whole batch.
//!
//! ## Ordering
//!
//! Records run concurrently through `buffered`, which yields results in input
//! order and only after each one has resolved, so response index `i` is
//! always request index `i`.

use crate::engine::ConversionEngine;
use crate::error::{BatchError, RecordError};
use crate::progress::ProgressCallback;
use crate::protocol::{ConversionRequest, ConversionResponse, WorkerFault};
use crate::record::{FileRecord, ImageType};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum WorkerMessage {
    Initialize {
        binary_location: std::path::PathBuf,
        reply: oneshot::Sender<Result<(), WorkerFault>>,
    },
    Convert {
        request: ConversionRequest,
        reply: oneshot::Sender<ConversionResponse>,
    },
}

/// Handle to a running worker task. Dropping it tears the worker down.
pub struct ConversionWorker {
    tx: mpsc::Sender<WorkerMessage>,
    handle: JoinHandle<()>,
}

impl ConversionWorker {
    /// Spawn a worker owning `engine` on the current tokio runtime.
    pub fn spawn(
        engine: Arc<dyn ConversionEngine>,
        concurrency: usize,
        progress: Option<ProgressCallback>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(4);
        let state = WorkerState {
            engine,
            initialized: OnceCell::new(),
            concurrency: concurrency.max(1),
            progress,
        };
        let handle = tokio::spawn(run(state, rx));
        debug!("Worker spawned");
        Self { tx, handle }
    }

    /// Ask the worker to initialise its engine. A no-op once it has succeeded.
    pub async fn initialize(
        &self,
        binary_location: impl AsRef<Path>,
    ) -> Result<Result<(), WorkerFault>, BatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Initialize {
            binary_location: binary_location.as_ref().to_path_buf(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| BatchError::WorkerUnavailable("worker dropped the reply".into()))
    }

    /// Submit one batch and wait for its response.
    ///
    /// `Err` means the transport failed (worker gone); a batch-level fault
    /// inside the worker arrives as `Ok(ConversionResponse::Failure)`.
    pub async fn submit(&self, request: ConversionRequest) -> Result<ConversionResponse, BatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Convert { request, reply }).await?;
        rx.await
            .map_err(|_| BatchError::WorkerUnavailable("worker dropped the reply".into()))
    }

    /// Stop the worker. Conversions already on the blocking pool finish
    /// detached; their results are discarded.
    pub fn terminate(self) {
        debug!("Worker terminated");
    }

    async fn send(&self, msg: WorkerMessage) -> Result<(), BatchError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| BatchError::WorkerUnavailable("request channel closed".into()))
    }
}

impl Drop for ConversionWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct WorkerState {
    engine: Arc<dyn ConversionEngine>,
    initialized: OnceCell<()>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

async fn run(state: WorkerState, mut rx: mpsc::Receiver<WorkerMessage>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMessage::Initialize {
                binary_location,
                reply,
            } => {
                let _ = reply.send(state.ensure_initialized(&binary_location).await);
            }
            WorkerMessage::Convert { request, reply } => {
                let response = state.convert_batch(request).await;
                if reply.send(response).is_err() {
                    warn!("Orchestrator stopped waiting; batch response discarded");
                }
            }
        }
    }
    debug!("Worker channel closed");
}

impl WorkerState {
    async fn ensure_initialized(&self, location: &Path) -> Result<(), WorkerFault> {
        let engine = Arc::clone(&self.engine);
        let loc = location.to_path_buf();
        self.initialized
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || engine.initialize(&loc))
                    .await
                    .map_err(|e| format!("initialisation panicked: {e}"))?
                    .map_err(|e| e.to_string())
            })
            .await
            .map(|_| ())
            .map_err(|detail| WorkerFault::EngineInit {
                location: location.to_path_buf(),
                detail,
            })
    }

    async fn convert_batch(&self, request: ConversionRequest) -> ConversionResponse {
        let ConversionRequest {
            records,
            format,
            binary_location,
        } = request;

        if let Err(fault) = self.ensure_initialized(&binary_location).await {
            warn!("Batch aborted: {}", fault);
            return ConversionResponse::Failure { error: fault };
        }

        let total = records.len();
        info!("Converting {} records to {}", total, format);
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let outcomes: Vec<(FileRecord, Option<RecordError>)> =
            stream::iter(records.into_iter().enumerate().map(|(index, record)| {
                let engine = Arc::clone(&self.engine);
                let progress = self.progress.clone();
                async move { convert_record(engine, index, total, record, format, progress).await }
            }))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut converted_files = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (record, failure) in outcomes {
            converted_files.push(record);
            failures.extend(failure);
        }

        let converted = total - failures.len();
        info!("Batch done: {}/{} converted", converted, total);
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, converted);
        }

        ConversionResponse::Success {
            converted_files,
            failures,
        }
    }
}

/// Convert one record, returning it unchanged on any failure.
async fn convert_record(
    engine: Arc<dyn ConversionEngine>,
    index: usize,
    total: usize,
    record: FileRecord,
    format: ImageType,
    progress: Option<ProgressCallback>,
) -> (FileRecord, Option<RecordError>) {
    let name = record.source().name().to_string();
    if let Some(ref cb) = progress {
        cb.on_record_start(index, total, &name);
    }

    match attempt(engine, index, &record, format).await {
        Ok(bytes) => {
            debug!("#{} '{}' → {} bytes", index, name, bytes.len());
            if let Some(ref cb) = progress {
                cb.on_record_converted(index, total, &name, bytes.len());
            }
            (record.converted(format, bytes), None)
        }
        Err(err) => {
            warn!("Passing through unchanged: {}", err);
            if let Some(ref cb) = progress {
                cb.on_record_passthrough(index, total, &name, &err.to_string());
            }
            (record, Some(err))
        }
    }
}

async fn attempt(
    engine: Arc<dyn ConversionEngine>,
    index: usize,
    record: &FileRecord,
    format: ImageType,
) -> Result<Vec<u8>, RecordError> {
    let source = record.source();
    let name = || source.name().to_string();

    let kind = source.kind().ok_or_else(|| RecordError::UnsupportedInput {
        index,
        name: name(),
        mime: source.mime().to_string(),
    })?;

    let bytes = Arc::clone(source.bytes());
    let joined = tokio::task::spawn_blocking(move || engine.convert(kind, &bytes, format)).await;

    match joined {
        Err(e) => Err(RecordError::Panicked {
            index,
            name: name(),
            detail: e.to_string(),
        }),
        Ok(Err(e)) => Err(RecordError::ConversionFailed {
            index,
            name: name(),
            detail: e.to_string(),
        }),
        Ok(Ok(Some(out))) if !out.is_empty() => Ok(out),
        Ok(Ok(_)) => Err(RecordError::NoOutput { index, name: name() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::record::{InputKind, SourceFile};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Engine scripted by payload: `bad` errors, `none` yields nothing,
    /// `panic` panics, `slowN` sleeps N×10ms. Output is `token:payload`.
    #[derive(Default)]
    struct ScriptedEngine {
        inits: AtomicUsize,
        calls: AtomicUsize,
        fail_init: bool,
    }

    impl ConversionEngine for ScriptedEngine {
        fn initialize(&self, _binary_location: &Path) -> Result<(), EngineError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(EngineError::Bind {
                    path: "/nope".into(),
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }

        fn convert(
            &self,
            _kind: InputKind,
            input: &[u8],
            format: ImageType,
        ) -> Result<Option<Vec<u8>>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match input {
                b"bad" => Err(EngineError::Decode("scripted".into())),
                b"none" => Ok(None),
                b"panic" => panic!("scripted panic"),
                other => {
                    if let Some(n) = other.strip_prefix(b"slow") {
                        let n: u64 = std::str::from_utf8(n).unwrap().parse().unwrap();
                        std::thread::sleep(Duration::from_millis(n * 10));
                    }
                    let mut out = format.token().as_bytes().to_vec();
                    out.push(b':');
                    out.extend_from_slice(other);
                    Ok(Some(out))
                }
            }
        }
    }

    fn rec(name: &str, payload: &[u8]) -> FileRecord {
        FileRecord::new(SourceFile::new(name, "image/png", payload.to_vec()))
    }

    fn request(records: Vec<FileRecord>) -> ConversionRequest {
        ConversionRequest {
            records,
            format: ImageType::WebP,
            binary_location: "/lib/libpdfium.so".into(),
        }
    }

    fn unwrap_success(resp: ConversionResponse) -> (Vec<FileRecord>, Vec<RecordError>) {
        match resp {
            ConversionResponse::Success {
                converted_files,
                failures,
            } => (converted_files, failures),
            ConversionResponse::Failure { error } => panic!("unexpected failure: {error}"),
        }
    }

    #[tokio::test]
    async fn order_is_preserved_despite_completion_order() {
        let engine = Arc::new(ScriptedEngine::default());
        let worker = ConversionWorker::spawn(engine, 4, None);
        let input: Vec<FileRecord> = ["slow9", "slow1", "slow5", "slow0", "slow3"]
            .iter()
            .map(|p| rec(&format!("{p}.png"), p.as_bytes()))
            .collect();
        let ids: Vec<_> = input.iter().map(|r| r.id()).collect();

        let (out, failures) = unwrap_success(worker.submit(request(input)).await.unwrap());

        assert!(failures.is_empty());
        assert_eq!(out.iter().map(|r| r.id()).collect::<Vec<_>>(), ids);
        assert_eq!(out[0].result_blob().unwrap().as_ref(), b"webp:slow9");
        assert_eq!(out[4].result_name(), Some("slow3.webp"));
    }

    #[tokio::test]
    async fn empty_batch_is_a_valid_noop() {
        let worker = ConversionWorker::spawn(Arc::new(ScriptedEngine::default()), 2, None);
        let (out, failures) = unwrap_success(worker.submit(request(vec![])).await.unwrap());
        assert!(out.is_empty());
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn single_failure_is_isolated() {
        let engine = Arc::new(ScriptedEngine::default());
        let worker = ConversionWorker::spawn(engine.clone(), 2, None);
        let input = vec![rec("a.png", b"a"), rec("b.png", b"bad"), rec("c.png", b"c")];
        let original_b = input[1].clone();

        let (out, failures) = unwrap_success(worker.submit(request(input)).await.unwrap());

        assert_eq!(out.len(), 3);
        assert!(out[0].is_converted());
        assert_eq!(out[1], original_b, "failed record must come back unchanged");
        assert!(out[2].is_converted());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index(), 1);
        assert!(matches!(failures[0], RecordError::ConversionFailed { .. }));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn none_panic_and_unknown_mime_all_pass_through() {
        let worker = ConversionWorker::spawn(Arc::new(ScriptedEngine::default()), 3, None);
        let odd = FileRecord::new(SourceFile::new("notes.txt", "text/plain", b"hi".to_vec()));
        let input = vec![rec("n.png", b"none"), rec("p.png", b"panic"), odd, rec("ok.png", b"ok")];

        let (out, failures) = unwrap_success(worker.submit(request(input)).await.unwrap());

        assert_eq!(out.len(), 4);
        assert_eq!(out.iter().filter(|r| r.is_converted()).count(), 1);
        assert!(out[3].is_converted());
        assert!(matches!(failures[0], RecordError::NoOutput { index: 0, .. }));
        assert!(matches!(failures[1], RecordError::Panicked { index: 1, .. }));
        assert!(matches!(failures[2], RecordError::UnsupportedInput { index: 2, .. }));
    }

    #[tokio::test]
    async fn initialisation_is_idempotent() {
        let engine = Arc::new(ScriptedEngine::default());
        let worker = ConversionWorker::spawn(engine.clone(), 1, None);

        worker.initialize("/lib/libpdfium.so").await.unwrap().unwrap();
        worker.initialize("/lib/libpdfium.so").await.unwrap().unwrap();
        worker.submit(request(vec![rec("a.png", b"a")])).await.unwrap();
        worker.submit(request(vec![rec("b.png", b"b")])).await.unwrap();

        assert_eq!(engine.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_failure_fails_the_batch() {
        let engine = Arc::new(ScriptedEngine {
            fail_init: true,
            ..Default::default()
        });
        let worker = ConversionWorker::spawn(engine.clone(), 1, None);

        let resp = worker.submit(request(vec![rec("a.png", b"a")])).await.unwrap();

        assert!(!resp.success());
        assert!(matches!(resp.error(), Some(WorkerFault::EngineInit { .. })));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_events_match_outcomes() {
        #[derive(Default)]
        struct Counter {
            converted: AtomicUsize,
            passthrough: AtomicUsize,
            completed: AtomicUsize,
        }
        impl crate::progress::BatchProgressCallback for Counter {
            fn on_record_converted(&self, _: usize, _: usize, _: &str, _: usize) {
                self.converted.fetch_add(1, Ordering::SeqCst);
            }
            fn on_record_passthrough(&self, _: usize, _: usize, _: &str, _: &str) {
                self.passthrough.fetch_add(1, Ordering::SeqCst);
            }
            fn on_batch_complete(&self, _: usize, converted: usize) {
                self.completed.store(converted, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter::default());
        let worker = ConversionWorker::spawn(
            Arc::new(ScriptedEngine::default()),
            2,
            Some(counter.clone() as ProgressCallback),
        );
        worker
            .submit(request(vec![rec("a.png", b"a"), rec("b.png", b"bad")]))
            .await
            .unwrap();

        assert_eq!(counter.converted.load(Ordering::SeqCst), 1);
        assert_eq!(counter.passthrough.load(Ordering::SeqCst), 1);
        assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
    }
}
