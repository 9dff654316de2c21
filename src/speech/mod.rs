//! Speech module — caption text → audible output.
//!
//! [`NativeSpeech`] wraps the operating system's TTS engine; [`SpeechSynth`]
//! is the seam the orchestrator talks to, so tests can substitute a mock.

pub mod engine;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{NativeSpeech, SpeechError, SpeechSynth};

#[cfg(test)]
pub use engine::MockSpeech;
