//! Task orchestration for the Accessible Image Captioner.
//!
//! This module owns everything between the presentation layer and the
//! blocking caption / speech services: the state machine, command
//! validation, and background task dispatch.
//!
//! # Architecture
//!
//! ```text
//! Command (UI thread)
//!        │
//!        ▼
//! StateController::request()      ── validates, mutates AppState/Session
//!        │
//!        ├─ SelectImage     → ImageLoaded (caption cleared)
//!        ├─ GenerateCaption → TaskRunner thread (CaptionEngine::generate)
//!        ├─ ReadAloud       → TaskRunner thread (SpeechSynth::speak)
//!        └─ Export          → synchronous UTF-8 write
//!
//! TaskRunner ── one std::thread per task ──▶ mpsc::Sender<TaskOutcome>
//!
//! StateController::poll()          ← drained by the UI thread each frame;
//!   └─ on_task_complete()            applies transitions, emits events
//! ```
//!
//! Only the UI-owning thread ever touches `AppState` / `Session`; worker
//! threads compute a value, send exactly one completion, and exit.

pub mod controller;
pub mod state;
pub mod task;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{
    Command, CommandRejected, ControllerError, ControllerEvent, StateController,
};
pub use state::{AppState, Session};
pub use task::{TaskKind, TaskOutcome, TaskRunner};
