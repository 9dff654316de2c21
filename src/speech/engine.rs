//! Core speech trait and the platform TTS implementation.
//!
//! # Overview
//!
//! [`SpeechSynth`] is the public interface used by the orchestrator.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn SpeechSynth>` and called from a worker thread.
//!
//! [`NativeSpeech`] speaks through the operating system's TTS engine via the
//! `tts` crate (speech-dispatcher on Linux, SAPI on Windows, AVFoundation on
//! macOS).  `speak` is synchronous within its own call: it returns only when
//! the utterance has finished playing, which is exactly what the
//! orchestrator's `Speaking` state needs.
//!
//! [`MockSpeech`] (available under `#[cfg(test)]`) records spoken texts or
//! fails on demand — useful for unit-testing the orchestrator without an
//! audio device.

use std::time::Duration;

use thiserror::Error;

use crate::config::SpeechConfig;

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

/// All errors that can arise from the speech subsystem.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    /// The platform TTS engine could not be initialised.
    #[error("Speech engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine rejected the utterance or playback failed.
    #[error("Speech playback failed: {0}")]
    Playback(String),

    /// Internal / unexpected error (e.g. a worker panic).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// SpeechSynth trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for text-to-speech engines.
///
/// # Contract
///
/// - `speak` blocks until the utterance has finished playing (or failed).
/// - There is no mid-utterance cancellation.
pub trait SpeechSynth: Send + Sync {
    /// Synthesize and play `text`, returning once playback is done.
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

// Compile-time assertion: Box<dyn SpeechSynth> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechSynth>) {}
};

// ---------------------------------------------------------------------------
// NativeSpeech
// ---------------------------------------------------------------------------

/// Platform TTS engine behind the `tts` crate.
///
/// The `tts::Tts` handle is not `Send` on every platform, so the engine is
/// constructed inside `speak` on the calling worker thread rather than held
/// across threads.  Engine construction is cheap next to synthesis, and a
/// broken platform engine then surfaces as a per-call
/// [`SpeechError::EngineUnavailable`] instead of a startup failure.
pub struct NativeSpeech {
    config: SpeechConfig,
}

/// Poll interval while waiting for an utterance to finish.
const SPEAK_POLL: Duration = Duration::from_millis(50);

impl NativeSpeech {
    /// Create a speech synthesizer with the given rate/volume settings.
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    /// Map a normalized 0–1 value onto `[min, max]`.
    fn denormalize(value: f32, min: f32, max: f32) -> f32 {
        min + value.clamp(0.0, 1.0) * (max - min)
    }
}

impl SpeechSynth for NativeSpeech {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut tts =
            tts::Tts::default().map_err(|e| SpeechError::EngineUnavailable(e.to_string()))?;

        let features = tts.supported_features();

        if features.rate {
            let rate = Self::denormalize(self.config.rate, tts.min_rate(), tts.max_rate());
            if let Err(e) = tts.set_rate(rate) {
                log::warn!("speech: could not set rate: {e}");
            }
        }
        if features.volume {
            let volume =
                Self::denormalize(self.config.volume, tts.min_volume(), tts.max_volume());
            if let Err(e) = tts.set_volume(volume) {
                log::warn!("speech: could not set volume: {e}");
            }
        }

        tts.speak(text, false)
            .map_err(|e| SpeechError::Playback(e.to_string()))?;

        // Engines that cannot report progress return after enqueueing;
        // everywhere else we block until the utterance completes.
        if features.is_speaking {
            loop {
                match tts.is_speaking() {
                    Ok(true) => std::thread::sleep(SPEAK_POLL),
                    Ok(false) => break,
                    Err(e) => {
                        log::warn!("speech: is_speaking query failed: {e}");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSpeech  (test-only)
// ---------------------------------------------------------------------------

/// A test double that records spoken texts or returns a configured error.
#[cfg(test)]
pub struct MockSpeech {
    error: Option<SpeechError>,
    spoken: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockSpeech {
    /// Create a mock that accepts every utterance and records it.
    pub fn ok() -> Self {
        Self {
            error: None,
            spoken: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns `Err(error)`.
    pub fn err(error: SpeechError) -> Self {
        Self {
            error: Some(error),
            spoken: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Texts spoken so far, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("mock lock").clone()
    }
}

#[cfg(test)]
impl SpeechSynth for MockSpeech {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.spoken.lock().expect("mock lock").push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
