//! Run one operation at a time in the background and talk to it over channels.
//!
//! An [`Operations`] value owns a single slot. Starting a copy, compress or
//! extract claims it and returns an [`OperationHandle`]; a second start while
//! the slot is taken fails with [`FileOpError::Busy`]. The work itself runs on
//! Tokio's blocking pool. Events flow out of the worker through an unbounded
//! channel; operator decisions flow back through a channel of capacity one,
//! and a copy that hits a failure blocks until exactly one decision arrives.
//!
//! Dropping the handle while a prompt is pending counts as `Abort`.

use crate::archive::{self, default_extract_dir, ArchiveFormat};
use crate::config::EngineConfig;
use crate::copy::copy_places;
use crate::error::FileOpError;
use crate::recovery::{CopyFailure, ErrorDecision, ErrorHandler};
use crate::types::{CompressStats, CopyStats, CopyTask, ExtractStats};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What kind of work an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Copy,
    Compress,
    Extract,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Copy => "copy",
            OperationKind::Compress => "compress",
            OperationKind::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// Final statistics of a successful operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationSummary {
    Copy(CopyStats),
    Compress(CompressStats),
    Extract(ExtractStats),
}

/// Message emitted by a running operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationEvent {
    /// An entry is about to be processed
    Progress { path: PathBuf },

    /// A copy failed on `path`; answer with [`OperationHandle::decide`]
    ErrorPrompt {
        path: PathBuf,
        message: String,
        attempt: u32,
    },

    /// The operation finished successfully
    Completed { summary: OperationSummary },

    /// The operation stopped on an error
    Failed { message: String },

    /// The operation was cancelled or aborted by the operator
    Cancelled,
}

/// Parameters of a background compression.
#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub format: ArchiveFormat,
    /// Archive path; the format's extension is appended when it has none
    pub output: PathBuf,
    /// Directory entry names are relative to
    pub parent: PathBuf,
    /// Files and directories to store; directories are expanded
    pub selection: Vec<PathBuf>,
}

/// Parameters of a background extraction.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub archive: PathBuf,
    /// Detected from the archive name when unset
    pub format: Option<ArchiveFormat>,
    /// Defaults to a directory named after the archive under the extract root
    pub destination: Option<PathBuf>,
}

struct ActiveOperation {
    id: Uuid,
    kind: OperationKind,
    cancel_flag: Arc<AtomicBool>,
}

type Slot = Arc<Mutex<Option<ActiveOperation>>>;

/// Serializes file operations: at most one runs at a time.
pub struct Operations {
    config: EngineConfig,
    active: Slot,
    hold_until_done: bool,
}

impl Operations {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: config.normalized(),
            active: Arc::new(Mutex::new(None)),
            hold_until_done: false,
        }
    }

    /// Keep the slot after the completion event until the operator sends
    /// [`ErrorDecision::Done`].
    pub fn with_hold_until_done(mut self, hold: bool) -> Self {
        self.hold_until_done = hold;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Id and kind of the running operation, if any.
    pub fn active(&self) -> Option<(Uuid, OperationKind)> {
        self.active.lock().as_ref().map(|op| (op.id, op.kind))
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Raise the cancel flag of the running operation. Returns false when idle.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(op) => {
                op.cancel_flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// A copy task using this instance's buffer size and overwrite policy.
    pub fn copy_task(&self, sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> CopyTask {
        CopyTask::new(sources, destination)
            .with_overwrite(self.config.overwrite)
            .with_buffer_size(self.config.buffer_size)
    }

    /// Start copying in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_copy(&self, task: CopyTask) -> Result<OperationHandle, FileOpError> {
        self.spawn(OperationKind::Copy, move |worker| {
            let events = &worker.events;
            let progress = |path: &Path| {
                let _ = events.send(OperationEvent::Progress {
                    path: path.to_path_buf(),
                });
            };
            let mut operator = ChannelOperator {
                events,
                decisions: &mut worker.decisions,
            };
            let stats = copy_places(&task, &mut operator, &progress, worker.cancel_flag.clone())?;
            Ok(OperationSummary::Copy(stats))
        })
    }

    /// Start compressing in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_compress(&self, request: CompressRequest) -> Result<OperationHandle, FileOpError> {
        let config = self.config.clone();
        self.spawn(OperationKind::Compress, move |worker| {
            let events = &worker.events;
            let progress = |path: &Path| {
                let _ = events.send(OperationEvent::Progress {
                    path: path.to_path_buf(),
                });
            };
            let stats = archive::compress_selection(
                request.format,
                &request.output,
                &request.parent,
                &request.selection,
                &config,
                &progress,
            )?;
            Ok(OperationSummary::Compress(stats))
        })
    }

    /// Start extracting in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_extract(&self, request: ExtractRequest) -> Result<OperationHandle, FileOpError> {
        let format = match request.format {
            Some(format) => format,
            None => ArchiveFormat::from_path(&request.archive)
                .ok_or_else(|| FileOpError::UnsupportedFormat(request.archive.display().to_string()))?,
        };
        let destination = request
            .destination
            .unwrap_or_else(|| default_extract_dir(&self.config.extract_root(), &request.archive));
        let archive_path = request.archive;

        self.spawn(OperationKind::Extract, move |worker| {
            let events = &worker.events;
            let progress = |path: &Path| {
                let _ = events.send(OperationEvent::Progress {
                    path: path.to_path_buf(),
                });
            };
            let stats = archive::extract(format, &archive_path, &destination, &progress)?;
            Ok(OperationSummary::Extract(stats))
        })
    }

    fn spawn<F>(&self, kind: OperationKind, work: F) -> Result<OperationHandle, FileOpError>
    where
        F: FnOnce(&mut Worker) -> Result<OperationSummary, FileOpError> + Send + 'static,
    {
        let (id, cancel_flag, slot) = self.claim(kind)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (decisions_tx, decisions_rx) = mpsc::channel(1);

        let worker = Worker {
            id,
            kind,
            events: events_tx,
            decisions: decisions_rx,
            cancel_flag: cancel_flag.clone(),
            hold_until_done: self.hold_until_done,
            _slot: slot,
        };
        let task = tokio::task::spawn_blocking(move || worker.run(work));

        Ok(OperationHandle {
            id,
            kind,
            events: events_rx,
            decisions: decisions_tx,
            cancel_flag,
            task,
        })
    }

    fn claim(&self, kind: OperationKind) -> Result<(Uuid, Arc<AtomicBool>, SlotGuard), FileOpError> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            tracing::warn!(running = %current.kind, requested = %kind, "operation already running");
            return Err(FileOpError::Busy);
        }

        let id = Uuid::new_v4();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        *active = Some(ActiveOperation {
            id,
            kind,
            cancel_flag: cancel_flag.clone(),
        });
        tracing::info!(id = %id, kind = %kind, "operation started");

        Ok((
            id,
            cancel_flag,
            SlotGuard {
                slot: self.active.clone(),
                id,
            },
        ))
    }
}

impl Default for Operations {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Caller's side of a running operation.
pub struct OperationHandle {
    pub id: Uuid,
    pub kind: OperationKind,
    events: mpsc::UnboundedReceiver<OperationEvent>,
    decisions: mpsc::Sender<ErrorDecision>,
    cancel_flag: Arc<AtomicBool>,
    task: JoinHandle<Result<OperationSummary, FileOpError>>,
}

impl OperationHandle {
    /// Next event, or `None` once the worker has finished and every event
    /// has been received.
    pub async fn next_event(&mut self) -> Option<OperationEvent> {
        self.events.recv().await
    }

    /// Answer the pending prompt.
    ///
    /// # Errors
    ///
    /// `Aborted` when the worker has already exited.
    pub async fn decide(&self, decision: ErrorDecision) -> Result<(), FileOpError> {
        self.decisions
            .send(decision)
            .await
            .map_err(|_| FileOpError::Aborted)
    }

    /// Ask the operation to stop at the next entry boundary. A pending
    /// prompt is answered with `Abort`.
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// A detached cancel switch, for signal handlers and other threads.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            cancel_flag: self.cancel_flag.clone(),
            decisions: self.decisions.clone(),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Wait for the worker to finish.
    ///
    /// Consumes the handle, so any prompt raised from here on is answered
    /// with `Abort`.
    pub async fn wait(self) -> Result<OperationSummary, FileOpError> {
        let OperationHandle {
            events, decisions, task, ..
        } = self;
        drop(decisions);
        drop(events);
        task.await
            .map_err(|e| FileOpError::Io(io::Error::other(e)))?
    }
}

/// Cancels one operation; see [`OperationHandle::canceller`].
#[derive(Clone)]
pub struct Canceller {
    cancel_flag: Arc<AtomicBool>,
    decisions: mpsc::Sender<ErrorDecision>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        let _ = self.decisions.try_send(ErrorDecision::Abort);
    }
}

/// Worker-side state, moved onto the blocking thread.
struct Worker {
    id: Uuid,
    kind: OperationKind,
    events: mpsc::UnboundedSender<OperationEvent>,
    decisions: mpsc::Receiver<ErrorDecision>,
    cancel_flag: Arc<AtomicBool>,
    hold_until_done: bool,
    _slot: SlotGuard,
}

impl Worker {
    fn run<F>(mut self, work: F) -> Result<OperationSummary, FileOpError>
    where
        F: FnOnce(&mut Worker) -> Result<OperationSummary, FileOpError>,
    {
        let result = work(&mut self);
        let cancelled = self.cancel_flag.load(Ordering::Relaxed);

        let result = match result {
            Ok(summary) => {
                tracing::info!(id = %self.id, kind = %self.kind, "operation completed");
                let _ = self.events.send(OperationEvent::Completed {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(e) if cancelled || e.is_aborted() => {
                tracing::info!(id = %self.id, kind = %self.kind, error = %e, "operation cancelled");
                let _ = self.events.send(OperationEvent::Cancelled);
                Err(FileOpError::Aborted)
            }
            Err(e) => {
                tracing::info!(id = %self.id, kind = %self.kind, error = %e, "operation failed");
                let _ = self.events.send(OperationEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        };

        if self.hold_until_done {
            self.wait_for_done();
        }
        result
    }

    fn wait_for_done(&mut self) {
        while let Some(decision) = self.decisions.blocking_recv() {
            if decision == ErrorDecision::Done {
                break;
            }
            tracing::debug!(?decision, "ignoring decision while waiting for Done");
        }
    }
}

/// Clears the slot when the worker exits, even by panic.
struct SlotGuard {
    slot: Slot,
    id: Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock();
        if active.as_ref().map(|op| op.id) == Some(self.id) {
            *active = None;
        }
    }
}

/// Answers failure prompts by asking the handle holder over the channels.
struct ChannelOperator<'a> {
    events: &'a mpsc::UnboundedSender<OperationEvent>,
    decisions: &'a mut mpsc::Receiver<ErrorDecision>,
}

impl ErrorHandler for ChannelOperator<'_> {
    fn decide(&mut self, failure: &CopyFailure) -> ErrorDecision {
        // Decisions sent while no prompt was pending do not answer this one.
        while let Ok(stale) = self.decisions.try_recv() {
            tracing::debug!(decision = ?stale, "discarding unsolicited decision");
        }

        let prompt = OperationEvent::ErrorPrompt {
            path: failure.path.clone(),
            message: failure.message.clone(),
            attempt: failure.attempt,
        };
        if self.events.send(prompt).is_err() {
            return ErrorDecision::Abort;
        }

        self.decisions.blocking_recv().unwrap_or(ErrorDecision::Abort)
    }
}
