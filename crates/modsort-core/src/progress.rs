//! Progress reporting from a run to its caller.
//!
//! The core never touches a UI. It emits `ProgressEvent`s into a
//! `ProgressSink`; a GUI, the CLI logger, a channel or a no-op for tests are
//! all just sinks.

use crate::types::FileResult;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Event emitted by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A file finished classification (hit, resolved, unknown or failed).
    Scan { done: usize, total: usize },
    /// A move was attempted.
    Move { done: usize, total: usize },
    /// Per-file outcome.
    FileResult(FileResult),
    /// The run is aborting.
    Fatal { message: String },
}

/// Receiver of progress events.
///
/// Sinks are called from the run task; implementations must hand the event
/// off rather than mutate caller-owned state directly.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // Receiver gone means the caller stopped listening; keep running.
        let _ = self.tx.send(event);
    }
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Counters for one run. Each only ever increases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub scanned: usize,
    pub scan_total: usize,
    pub resolved: usize,
    pub moved: usize,
    pub move_total: usize,
}

/// Owns the run counters and turns updates into sink events.
pub struct ProgressTracker {
    state: Mutex<RunProgress>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(RunProgress::default()),
            sink,
        }
    }

    /// Tracker that reports nowhere.
    pub fn silent() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    // Counters stay valid if a sink panicked while the lock was held.
    fn state(&self) -> MutexGuard<'_, RunProgress> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current counters.
    pub fn snapshot(&self) -> RunProgress {
        *self.state()
    }

    pub fn begin_scan(&self, total: usize) {
        let mut state = self.state();
        state.scan_total = state.scan_total.max(total);
    }

    /// Count a classified file and report its outcome.
    pub fn record_scan(&self, result: FileResult) {
        let (done, total) = {
            let mut state = self.state();
            state.scanned += 1;
            (state.scanned, state.scan_total)
        };
        self.sink.emit(ProgressEvent::FileResult(result));
        self.sink.emit(ProgressEvent::Scan { done, total });
    }

    /// Count a file whose type was learned from the cache or the remote.
    pub fn record_resolved(&self) {
        let mut state = self.state();
        state.resolved += 1;
    }

    pub fn begin_move(&self, total: usize) {
        let mut state = self.state();
        state.move_total = state.move_total.max(total);
    }

    /// Count an attempted move and report its outcome.
    pub fn record_move(&self, result: FileResult) {
        let (done, total) = {
            let mut state = self.state();
            state.moved += 1;
            (state.moved, state.move_total)
        };
        self.sink.emit(ProgressEvent::FileResult(result));
        self.sink.emit(ProgressEvent::Move { done, total });
    }

    /// Report a file outcome that does not advance any counter.
    pub fn report(&self, result: FileResult) {
        self.sink.emit(ProgressEvent::FileResult(result));
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.sink.emit(ProgressEvent::Fatal {
            message: message.into(),
        });
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.snapshot())
            .finish()
    }
}
