//! Background task runner — one fresh worker thread per dispatched task.
//!
//! # Contract
//!
//! [`TaskRunner::dispatch`] executes a blocking job off the calling thread
//! and guarantees that **exactly one** [`TaskOutcome`] is delivered on the
//! completion channel: the job's own outcome, or — when the job panics or
//! the worker thread cannot be spawned — the outcome built by the `on_panic`
//! fallback.  Worker panics never propagate to the UI thread.
//!
//! There is no pooling, queueing, retrying, cancellation, or timeout: each
//! thread runs one job to completion and exits.  Mutual exclusion between
//! tasks of the same kind is the [`StateController`](super::StateController)'s
//! job — a second request of an in-flight kind is rejected before it ever
//! reaches the runner.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::caption::{CaptionEngine, CaptionError};
use crate::speech::SpeechError;

// ---------------------------------------------------------------------------
// TaskKind / TaskOutcome
// ---------------------------------------------------------------------------

/// The three kinds of deferred, potentially blocking work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Load the captioning model (startup, once).
    LoadModel,
    /// Run caption inference for the selected image.
    GenerateCaption,
    /// Speak the generated caption.
    Speak,
}

impl TaskKind {
    /// Short name used for worker-thread names and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::LoadModel => "load-model",
            TaskKind::GenerateCaption => "caption",
            TaskKind::Speak => "speak",
        }
    }
}

/// Completion of a dispatched task, carrying its typed result.
pub enum TaskOutcome {
    /// The model finished loading (or failed to).
    ModelLoaded(Result<Arc<dyn CaptionEngine>, CaptionError>),
    /// Caption inference finished.  `epoch` identifies the image selection
    /// the caption belongs to.
    CaptionGenerated {
        epoch: u64,
        result: Result<String, CaptionError>,
    },
    /// Speech playback finished.
    SpeechFinished(Result<(), SpeechError>),
}

impl TaskOutcome {
    /// The kind of task this outcome completes.
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutcome::ModelLoaded(_) => TaskKind::LoadModel,
            TaskOutcome::CaptionGenerated { .. } => TaskKind::GenerateCaption,
            TaskOutcome::SpeechFinished(_) => TaskKind::Speak,
        }
    }
}

impl std::fmt::Debug for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::ModelLoaded(r) => f
                .debug_tuple("ModelLoaded")
                .field(&r.as_ref().map(|_| "engine"))
                .finish(),
            TaskOutcome::CaptionGenerated { epoch, result } => f
                .debug_struct("CaptionGenerated")
                .field("epoch", epoch)
                .field("result", result)
                .finish(),
            TaskOutcome::SpeechFinished(r) => {
                f.debug_tuple("SpeechFinished").field(r).finish()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TaskRunner
// ---------------------------------------------------------------------------

/// Dispatches blocking jobs onto single-use worker threads and funnels their
/// completions into one channel, drained by the UI-owning thread.
pub struct TaskRunner {
    tx: Sender<TaskOutcome>,
}

impl TaskRunner {
    /// Create a runner and the receiving end of its completion channel.
    pub fn new() -> (Self, Receiver<TaskOutcome>) {
        let (tx, rx) = channel();
        (Self { tx }, rx)
    }

    /// Run `job` on a fresh worker thread.
    ///
    /// Exactly one outcome reaches the completion channel: `job`'s return
    /// value, or `on_panic(message)` when `job` panics or the thread cannot
    /// be spawned.
    pub fn dispatch<J, P>(&self, kind: TaskKind, job: J, on_panic: P)
    where
        J: FnOnce() -> TaskOutcome + Send + 'static,
        P: Fn(String) -> TaskOutcome + Send + Sync + 'static,
    {
        let tx = self.tx.clone();
        let on_panic = Arc::new(on_panic);
        let on_panic_worker = Arc::clone(&on_panic);

        let spawned = std::thread::Builder::new()
            .name(format!("task-{}", kind.label()))
            .spawn(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(job)) {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("task {} panicked: {message}", kind.label());
                        (*on_panic_worker)(message)
                    }
                };
                if tx.send(outcome).is_err() {
                    log::warn!("task {}: completion receiver dropped", kind.label());
                }
            });

        if let Err(e) = spawned {
            log::error!("task {}: could not spawn worker thread: {e}", kind.label());
            let _ = self
                .tx
                .send((*on_panic)(format!("could not spawn worker thread: {e}")));
        }
    }
}

/// Best-effort extraction of a panic payload's message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
