//! Application state machine and session record.
//!
//! [`AppState`] is the single process-wide state the orchestrator moves
//! through; [`Session`] holds the currently selected image and its caption.
//! Both are mutated only on the UI-owning thread, inside the
//! [`StateController`](super::StateController).

use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// States of the captioning workflow.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──startup──▶ ModelLoading ──ok──▶ Ready ──select──▶ ImageLoaded
///                        └──err──▶ Error (fatal)
/// ImageLoaded ──generate──▶ Captioning ──ok──▶ CaptionReady ──auto──▶ Speaking
///                                └──err──▶ ImageLoaded (notice shown)
/// CaptionReady ──read aloud──▶ Speaking ──done / err──▶ CaptionReady
/// any non-loading, non-error state ──select──▶ ImageLoaded (caption cleared)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Process start, before the model load has been dispatched.
    Idle,

    /// The captioning model is loading on a worker thread.
    ModelLoading,

    /// Model loaded, no image selected yet.
    Ready,

    /// An image is selected; no caption exists for it.
    ImageLoaded,

    /// A caption request is in flight on a worker thread.
    Captioning,

    /// A caption exists for the selected image.
    CaptionReady,

    /// The caption is being spoken on a worker thread.
    Speaking,

    /// The model failed to load.  Unrecoverable; captioning stays disabled.
    Error,
}

impl AppState {
    /// Returns `true` while a worker task for this state is in flight.
    ///
    /// The UI uses this to keep repainting (and therefore polling for
    /// completions) while work is outstanding.
    ///
    /// ```
    /// use image_captioner::orchestrator::AppState;
    ///
    /// assert!(AppState::ModelLoading.is_busy());
    /// assert!(AppState::Captioning.is_busy());
    /// assert!(AppState::Speaking.is_busy());
    /// assert!(!AppState::CaptionReady.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AppState::ModelLoading | AppState::Captioning | AppState::Speaking
        )
    }

    /// A short human-readable label suitable for the UI status line.
    pub fn label(&self) -> &'static str {
        match self {
            AppState::Idle => "Starting",
            AppState::ModelLoading => "Loading model",
            AppState::Ready => "Ready",
            AppState::ImageLoaded => "Image loaded",
            AppState::Captioning => "Generating caption",
            AppState::CaptionReady => "Caption ready",
            AppState::Speaking => "Reading aloud",
            AppState::Error => "Model unavailable",
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::Idle
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The in-memory record of the currently selected image and its caption.
///
/// Exactly one `Session` exists per running application instance.  The image
/// epoch increments on every selection so that completions belonging to a
/// previously selected image can be recognised and discarded.
#[derive(Debug, Default)]
pub struct Session {
    image: Option<PathBuf>,
    caption: Option<String>,
    epoch: u64,
}

impl Session {
    /// Empty session: no image, no caption.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the currently selected image, if any.
    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    /// The generated caption for the current image, if any.
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// Identity counter for the current image selection.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Select a new image.  Clears any previous caption and bumps the epoch.
    pub(crate) fn set_image(&mut self, path: PathBuf) {
        self.image = Some(path);
        self.caption = None;
        self.epoch += 1;
    }

    /// Store the caption generated for the current image.
    pub(crate) fn set_caption(&mut self, caption: String) {
        self.caption = Some(caption);
    }

    /// Drop the caption (a fresh caption request is about to start).
    pub(crate) fn clear_caption(&mut self) {
        self.caption = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- AppState::is_busy ---

    #[test]
    fn loading_states_are_busy() {
        assert!(AppState::ModelLoading.is_busy());
        assert!(AppState::Captioning.is_busy());
        assert!(AppState::Speaking.is_busy());
    }

    #[test]
    fn settled_states_are_not_busy() {
        assert!(!AppState::Idle.is_busy());
        assert!(!AppState::Ready.is_busy());
        assert!(!AppState::ImageLoaded.is_busy());
        assert!(!AppState::CaptionReady.is_busy());
        assert!(!AppState::Error.is_busy());
    }

    // ---- AppState::label ---

    #[test]
    fn every_state_has_a_label() {
        for state in [
            AppState::Idle,
            AppState::ModelLoading,
            AppState::Ready,
            AppState::ImageLoaded,
            AppState::Captioning,
            AppState::CaptionReady,
            AppState::Speaking,
            AppState::Error,
        ] {
            assert!(!state.label().is_empty());
        }
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(AppState::default(), AppState::Idle);
    }

    // ---- Session ---

    #[test]
    fn new_session_is_empty() {
        let session = Session::new();
        assert!(session.image().is_none());
        assert!(session.caption().is_none());
        assert_eq!(session.epoch(), 0);
    }

    #[test]
    fn set_image_clears_caption_and_bumps_epoch() {
        let mut session = Session::new();
        session.set_image(PathBuf::from("a.jpg"));
        session.set_caption("a red square".into());

        session.set_image(PathBuf::from("b.jpg"));

        assert_eq!(session.image(), Some(Path::new("b.jpg")));
        assert!(session.caption().is_none());
        assert_eq!(session.epoch(), 2);
    }

    #[test]
    fn clear_caption_keeps_image_and_epoch() {
        let mut session = Session::new();
        session.set_image(PathBuf::from("a.jpg"));
        session.set_caption("text".into());

        session.clear_caption();

        assert_eq!(session.image(), Some(Path::new("a.jpg")));
        assert!(session.caption().is_none());
        assert_eq!(session.epoch(), 1);
    }
}
