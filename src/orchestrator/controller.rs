//! State controller — command validation and completion transitions.
//!
//! [`StateController`] owns the [`AppState`] machine and the [`Session`].
//! User commands enter through [`request`](StateController::request), which
//! synchronously validates preconditions and either dispatches a background
//! task or rejects the command with a [`CommandRejected`] warning.  Task
//! completions enter through [`poll`](StateController::poll) /
//! [`on_task_complete`](StateController::on_task_complete), which apply the
//! deterministic transitions and emit [`ControllerEvent`]s for the UI.
//!
//! All mutation of `AppState` / `Session` happens here, on the UI-owning
//! thread; worker threads only compute values and report them through the
//! completion channel.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use thiserror::Error;

use crate::caption::{CaptionEngine, CaptionError, GenerateParams};
use crate::export::{self, ExportError};
use crate::speech::{SpeechError, SpeechSynth};

use super::state::{AppState, Session};
use super::task::{TaskKind, TaskOutcome, TaskRunner};

// ---------------------------------------------------------------------------
// Commands and errors
// ---------------------------------------------------------------------------

/// User commands accepted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Select the image at the given path as the session's current image.
    SelectImage(PathBuf),
    /// Generate a caption for the current image.
    GenerateCaption,
    /// Speak the current caption.
    ReadAloud,
    /// Write the current caption to the given path as UTF-8 text.
    Export(PathBuf),
    /// Flip the presentation layer's contrast scheme.  Valid in every
    /// state; never touches [`AppState`] — the UI applies the visual change.
    ToggleContrast,
}

/// A command whose preconditions were not met.  Synchronous, no state
/// change; the UI surfaces the message as a warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandRejected {
    /// The model has not finished loading yet.
    #[error("The captioning model is still loading — please wait")]
    ModelNotReady,

    /// The model failed to load; captioning is permanently disabled.
    #[error("The captioning model failed to load; captioning is unavailable")]
    ModelFailed,

    /// No image has been selected.
    #[error("Please select an image first")]
    NoImage,

    /// No caption has been generated for the current image.
    #[error("Please generate a caption first")]
    NoCaption,

    /// A caption task is already in flight.
    #[error("A caption is already being generated")]
    CaptioningInProgress,

    /// A speech task is already in flight.
    #[error("The caption is already being read aloud")]
    SpeechInProgress,
}

/// Errors returned from [`StateController::request`].
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Precondition failure — warning-level, no state change.
    #[error(transparent)]
    Rejected(#[from] CommandRejected),

    /// The export write failed.
    #[error("Failed to export caption: {0}")]
    Export(#[from] ExportError),
}

// ---------------------------------------------------------------------------
// ControllerEvent
// ---------------------------------------------------------------------------

/// State-transition notifications emitted from completion handling.
///
/// The UI turns these into status-line updates and dismissible notices.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The model loaded; captioning is available.
    ModelReady,
    /// The model failed to load.  Fatal: the app stays alive but captioning
    /// is disabled for the rest of the run.
    ModelLoadFailed(String),
    /// A caption was generated.  `speaking` is `true` when a speech task was
    /// auto-dispatched for it.
    CaptionGenerated { caption: String, speaking: bool },
    /// Caption generation failed; the previous state was restored.
    CaptionFailed(String),
    /// Speech playback finished.
    SpeechFinished,
    /// Speech playback failed; the caption is still available.
    SpeechFailed(String),
}

// ---------------------------------------------------------------------------
// StateController
// ---------------------------------------------------------------------------

/// Owns the application state machine, the session, and task dispatch.
///
/// Created once at startup on the UI thread and driven from there:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use image_captioner::caption::GenerateParams;
/// use image_captioner::config::{CaptionConfig, SpeechConfig};
/// use image_captioner::orchestrator::{Command, StateController};
/// use image_captioner::speech::NativeSpeech;
///
/// let speech = Arc::new(NativeSpeech::new(SpeechConfig::default()));
/// let mut controller = StateController::new(speech, GenerateParams::default(), true);
///
/// let caption_config = CaptionConfig::default();
/// controller.begin_model_load(move || {
///     use image_captioner::caption::{BlipCaptioner, CaptionEngine};
///     let engine = BlipCaptioner::load(&caption_config)?;
///     Ok(Arc::new(engine) as Arc<dyn CaptionEngine>)
/// });
///
/// // each UI frame:
/// for _event in controller.poll() {
///     // update status line / show notices
/// }
/// let _ = controller.request(Command::SelectImage("photo.jpg".into()));
/// ```
pub struct StateController {
    state: AppState,
    session: Session,
    engine: Option<Arc<dyn CaptionEngine>>,
    speech: Arc<dyn SpeechSynth>,
    runner: TaskRunner,
    completions: Receiver<TaskOutcome>,
    params: GenerateParams,
    auto_read_aloud: bool,
}

impl StateController {
    /// Create a controller in the `Idle` state.
    ///
    /// * `speech`          — speech synthesizer used by `Speak` tasks.
    /// * `params`          — decoding parameters for every caption request.
    /// * `auto_read_aloud` — speak each fresh caption automatically.
    pub fn new(
        speech: Arc<dyn SpeechSynth>,
        params: GenerateParams,
        auto_read_aloud: bool,
    ) -> Self {
        let (runner, completions) = TaskRunner::new();
        Self {
            state: AppState::Idle,
            session: Session::new(),
            engine: None,
            speech,
            runner,
            completions,
            params,
            auto_read_aloud,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    /// Current application state.
    pub fn state(&self) -> AppState {
        self.state
    }

    /// The session record (current image + caption).
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the captioning model has finished loading.
    pub fn model_loaded(&self) -> bool {
        self.engine.is_some()
    }

    // ── Affordances (drive enabled/disabled UI controls) ─────────────────

    /// `SelectImage` is accepted in the current state.
    pub fn can_select_image(&self) -> bool {
        !matches!(
            self.state,
            AppState::Idle | AppState::ModelLoading | AppState::Error
        )
    }

    /// `GenerateCaption` is accepted in the current state.
    pub fn can_generate_caption(&self) -> bool {
        self.engine.is_some()
            && self.session.image().is_some()
            && matches!(self.state, AppState::ImageLoaded | AppState::CaptionReady)
    }

    /// `ReadAloud` is accepted in the current state.
    pub fn can_read_aloud(&self) -> bool {
        self.session.caption().is_some() && self.state == AppState::CaptionReady
    }

    /// `Export` is accepted in the current state.
    pub fn can_export(&self) -> bool {
        self.session.caption().is_some() && self.state == AppState::CaptionReady
    }

    // ── Startup ──────────────────────────────────────────────────────────

    /// Dispatch the one-time model load task.  `Idle → ModelLoading`.
    ///
    /// Called once at startup; any later call is ignored with a warning.
    pub fn begin_model_load<F>(&mut self, loader: F)
    where
        F: FnOnce() -> Result<Arc<dyn CaptionEngine>, CaptionError> + Send + 'static,
    {
        if self.state != AppState::Idle {
            log::warn!("begin_model_load ignored in state {:?}", self.state);
            return;
        }

        log::info!("dispatching model load");
        self.state = AppState::ModelLoading;
        self.runner.dispatch(
            TaskKind::LoadModel,
            move || TaskOutcome::ModelLoaded(loader()),
            |message| TaskOutcome::ModelLoaded(Err(CaptionError::Internal(message))),
        );
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Validate and execute a user command.
    ///
    /// Rejections are synchronous and leave all state untouched.
    pub fn request(&mut self, command: Command) -> Result<(), ControllerError> {
        match command {
            Command::SelectImage(path) => self.select_image(path)?,
            Command::GenerateCaption => self.generate_caption()?,
            Command::ReadAloud => self.read_aloud()?,
            Command::Export(dest) => self.export(&dest)?,
            // Presentation-only; valid everywhere, no state change.
            Command::ToggleContrast => {}
        }
        Ok(())
    }

    fn select_image(&mut self, path: PathBuf) -> Result<(), CommandRejected> {
        match self.state {
            AppState::Idle | AppState::ModelLoading => Err(CommandRejected::ModelNotReady),
            AppState::Error => Err(CommandRejected::ModelFailed),
            _ => {
                log::info!("image selected: {}", path.display());
                self.session.set_image(path);
                self.state = AppState::ImageLoaded;
                Ok(())
            }
        }
    }

    fn generate_caption(&mut self) -> Result<(), CommandRejected> {
        match self.state {
            AppState::Captioning => return Err(CommandRejected::CaptioningInProgress),
            AppState::Speaking => return Err(CommandRejected::SpeechInProgress),
            AppState::Idle | AppState::ModelLoading => {
                return Err(CommandRejected::ModelNotReady)
            }
            AppState::Error => return Err(CommandRejected::ModelFailed),
            AppState::Ready | AppState::ImageLoaded | AppState::CaptionReady => {}
        }

        let engine = self
            .engine
            .clone()
            .ok_or(CommandRejected::ModelNotReady)?;
        let image = self
            .session
            .image()
            .map(Path::to_path_buf)
            .ok_or(CommandRejected::NoImage)?;

        let epoch = self.session.epoch();
        let params = self.params.clone();

        log::info!("dispatching caption generation for {}", image.display());
        self.session.clear_caption();
        self.state = AppState::Captioning;
        self.runner.dispatch(
            TaskKind::GenerateCaption,
            move || TaskOutcome::CaptionGenerated {
                epoch,
                result: engine.generate(&image, &params),
            },
            move |message| TaskOutcome::CaptionGenerated {
                epoch,
                result: Err(CaptionError::Internal(message)),
            },
        );
        Ok(())
    }

    fn read_aloud(&mut self) -> Result<(), CommandRejected> {
        match self.state {
            AppState::Speaking => return Err(CommandRejected::SpeechInProgress),
            AppState::Captioning => return Err(CommandRejected::CaptioningInProgress),
            _ => {}
        }

        let caption = self
            .session
            .caption()
            .ok_or(CommandRejected::NoCaption)?
            .to_string();

        self.dispatch_speak(caption);
        Ok(())
    }

    fn export(&mut self, dest: &Path) -> Result<(), ControllerError> {
        match self.state {
            AppState::Captioning => {
                return Err(CommandRejected::CaptioningInProgress.into())
            }
            AppState::Speaking => return Err(CommandRejected::SpeechInProgress.into()),
            _ => {}
        }

        let caption = self.session.caption().ok_or(CommandRejected::NoCaption)?;
        export::write_caption(dest, caption)?;
        Ok(())
    }

    fn dispatch_speak(&mut self, caption: String) {
        let speech = Arc::clone(&self.speech);
        log::info!("dispatching speech ({} chars)", caption.len());
        self.state = AppState::Speaking;
        self.runner.dispatch(
            TaskKind::Speak,
            move || TaskOutcome::SpeechFinished(speech.speak(&caption)),
            |message| TaskOutcome::SpeechFinished(Err(SpeechError::Internal(message))),
        );
    }

    // ── Completions ──────────────────────────────────────────────────────

    /// Drain pending task completions (non-blocking) and apply each one.
    ///
    /// Call once per UI frame, on the UI-owning thread.
    pub fn poll(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(outcome) = self.completions.try_recv() {
            if let Some(event) = self.on_task_complete(outcome) {
                events.push(event);
            }
        }
        events
    }

    /// Apply one task completion to the state machine.
    ///
    /// Completions arriving outside their dispatching state — or, for
    /// captions, for an image that has since been replaced — are discarded.
    pub fn on_task_complete(&mut self, outcome: TaskOutcome) -> Option<ControllerEvent> {
        match outcome {
            TaskOutcome::ModelLoaded(result) => {
                if self.state != AppState::ModelLoading {
                    log::warn!("model-load completion discarded in {:?}", self.state);
                    return None;
                }
                match result {
                    Ok(engine) => {
                        self.engine = Some(engine);
                        self.state = AppState::Ready;
                        log::info!("model ready");
                        Some(ControllerEvent::ModelReady)
                    }
                    Err(e) => {
                        self.state = AppState::Error;
                        log::error!("model load failed: {e}");
                        Some(ControllerEvent::ModelLoadFailed(e.to_string()))
                    }
                }
            }

            TaskOutcome::CaptionGenerated { epoch, result } => {
                if self.state != AppState::Captioning || epoch != self.session.epoch() {
                    log::debug!(
                        "stale caption completion discarded (epoch {epoch}, state {:?})",
                        self.state
                    );
                    return None;
                }
                match result {
                    Ok(caption) => {
                        self.session.set_caption(caption.clone());
                        self.state = AppState::CaptionReady;
                        log::info!("caption ready: {caption:?}");
                        let speaking = self.auto_read_aloud;
                        if speaking {
                            self.dispatch_speak(caption.clone());
                        }
                        Some(ControllerEvent::CaptionGenerated { caption, speaking })
                    }
                    Err(e) => {
                        self.state = AppState::ImageLoaded;
                        log::warn!("caption generation failed: {e}");
                        Some(ControllerEvent::CaptionFailed(e.to_string()))
                    }
                }
            }

            TaskOutcome::SpeechFinished(result) => {
                if self.state != AppState::Speaking {
                    log::debug!("stale speech completion discarded in {:?}", self.state);
                    return None;
                }
                self.state = AppState::CaptionReady;
                match result {
                    Ok(()) => Some(ControllerEvent::SpeechFinished),
                    Err(e) => {
                        log::warn!("speech failed: {e}");
                        Some(ControllerEvent::SpeechFailed(e.to_string()))
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::caption::MockCaptioner;
    use crate::speech::MockSpeech;

    const WAIT: Duration = Duration::from_secs(5);

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn controller_with(speech: Arc<dyn SpeechSynth>, auto: bool) -> StateController {
        StateController::new(speech, GenerateParams::default(), auto)
    }

    /// Poll until `target` is reached, collecting events along the way.
    fn wait_for_state(
        controller: &mut StateController,
        target: AppState,
    ) -> Vec<ControllerEvent> {
        let deadline = Instant::now() + WAIT;
        let mut events = Vec::new();
        loop {
            events.extend(controller.poll());
            if controller.state() == target {
                return events;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {target:?}, still in {:?}",
                controller.state()
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// A controller whose model load already succeeded (mock engine).
    fn ready_controller(
        captioner: MockCaptioner,
        speech: Arc<dyn SpeechSynth>,
        auto: bool,
    ) -> StateController {
        let mut controller = controller_with(speech, auto);
        let engine: Arc<dyn CaptionEngine> = Arc::new(captioner);
        controller.begin_model_load(move || Ok(engine));
        wait_for_state(&mut controller, AppState::Ready);
        controller
    }

    // -----------------------------------------------------------------------
    // Model loading
    // -----------------------------------------------------------------------

    #[test]
    fn model_load_success_reaches_ready() {
        let mut controller = controller_with(Arc::new(MockSpeech::ok()), true);
        assert_eq!(controller.state(), AppState::Idle);

        let engine: Arc<dyn CaptionEngine> = Arc::new(MockCaptioner::ok("x"));
        controller.begin_model_load(move || Ok(engine));
        assert_eq!(controller.state(), AppState::ModelLoading);

        let events = wait_for_state(&mut controller, AppState::Ready);
        assert!(events.contains(&ControllerEvent::ModelReady));
        assert!(controller.model_loaded());
    }

    #[test]
    fn model_load_failure_is_fatal() {
        let mut controller = controller_with(Arc::new(MockSpeech::ok()), true);
        controller.begin_model_load(|| Err(CaptionError::Fetch("offline".into())));

        let events = wait_for_state(&mut controller, AppState::Error);
        assert!(matches!(
            events.as_slice(),
            [ControllerEvent::ModelLoadFailed(msg)] if msg.contains("offline")
        ));

        // Every captioning affordance stays off; commands are rejected.
        assert!(!controller.can_select_image());
        assert!(!controller.can_generate_caption());
        let err = controller
            .request(Command::SelectImage("a.jpg".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::ModelFailed)
        ));
    }

    #[test]
    fn commands_rejected_while_model_loading() {
        let mut controller = controller_with(Arc::new(MockSpeech::ok()), true);
        let engine: Arc<dyn CaptionEngine> = Arc::new(MockCaptioner::ok("x"));
        controller.begin_model_load(move || {
            std::thread::sleep(Duration::from_millis(100));
            Ok(engine)
        });

        let err = controller
            .request(Command::SelectImage("a.jpg".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::ModelNotReady)
        ));

        let err = controller.request(Command::GenerateCaption).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::ModelNotReady)
        ));

        wait_for_state(&mut controller, AppState::Ready);
    }

    // -----------------------------------------------------------------------
    // Command validation
    // -----------------------------------------------------------------------

    #[test]
    fn select_image_moves_to_image_loaded() {
        let mut controller =
            ready_controller(MockCaptioner::ok("x"), Arc::new(MockSpeech::ok()), true);

        controller
            .request(Command::SelectImage("photo.jpg".into()))
            .expect("accepted");

        assert_eq!(controller.state(), AppState::ImageLoaded);
        assert_eq!(controller.session().image(), Some(Path::new("photo.jpg")));
        assert!(controller.session().caption().is_none());
        assert!(controller.can_generate_caption());
    }

    #[test]
    fn generate_caption_rejected_without_image() {
        let mut controller =
            ready_controller(MockCaptioner::ok("x"), Arc::new(MockSpeech::ok()), true);

        let err = controller.request(Command::GenerateCaption).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::NoImage)
        ));
        assert_eq!(controller.state(), AppState::Ready);
    }

    #[test]
    fn read_aloud_rejected_without_caption() {
        let mut controller =
            ready_controller(MockCaptioner::ok("x"), Arc::new(MockSpeech::ok()), true);
        controller
            .request(Command::SelectImage("photo.jpg".into()))
            .expect("accepted");

        let err = controller.request(Command::ReadAloud).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::NoCaption)
        ));
    }

    #[test]
    fn toggle_contrast_is_valid_in_every_state() {
        // Idle
        let mut controller = controller_with(Arc::new(MockSpeech::ok()), true);
        assert!(controller.request(Command::ToggleContrast).is_ok());
        assert_eq!(controller.state(), AppState::Idle);

        // Error
        controller.begin_model_load(|| Err(CaptionError::Fetch("down".into())));
        wait_for_state(&mut controller, AppState::Error);
        assert!(controller.request(Command::ToggleContrast).is_ok());
        assert_eq!(controller.state(), AppState::Error);
    }

    // -----------------------------------------------------------------------
    // Captioning flow
    // -----------------------------------------------------------------------

    /// The full §-by-§ happy path: select → caption → auto-speak → settle.
    #[test]
    fn caption_success_auto_speaks_and_settles() {
        let speech = Arc::new(MockSpeech::ok());
        let mut controller = ready_controller(
            MockCaptioner::ok("a red square"),
            Arc::clone(&speech) as Arc<dyn SpeechSynth>,
            true,
        );

        controller
            .request(Command::SelectImage("photo.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");
        assert_eq!(controller.state(), AppState::Captioning);

        let events = wait_for_state(&mut controller, AppState::CaptionReady);

        assert!(events.contains(&ControllerEvent::CaptionGenerated {
            caption: "a red square".into(),
            speaking: true,
        }));
        assert!(events.contains(&ControllerEvent::SpeechFinished));
        assert_eq!(controller.session().caption(), Some("a red square"));
        assert_eq!(speech.spoken(), vec!["a red square"]);
        assert!(controller.can_read_aloud());
        assert!(controller.can_export());
    }

    #[test]
    fn caption_failure_returns_to_image_loaded() {
        let mut controller = ready_controller(
            MockCaptioner::err(CaptionError::Decode("bad file".into())),
            Arc::new(MockSpeech::ok()),
            true,
        );

        controller
            .request(Command::SelectImage("broken.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");

        let events = wait_for_state(&mut controller, AppState::ImageLoaded);
        assert!(matches!(
            events.as_slice(),
            [ControllerEvent::CaptionFailed(msg)] if msg.contains("bad file")
        ));

        // The affordance is re-enabled for a retry.
        assert!(controller.can_generate_caption());
        assert!(controller.session().caption().is_none());
    }

    #[test]
    fn second_generate_rejected_while_captioning() {
        let mut controller = ready_controller(
            MockCaptioner::ok_after("slow caption", Duration::from_millis(100)),
            Arc::new(MockSpeech::ok()),
            false,
        );

        controller
            .request(Command::SelectImage("photo.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");

        let err = controller.request(Command::GenerateCaption).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::CaptioningInProgress)
        ));

        wait_for_state(&mut controller, AppState::CaptionReady);
    }

    #[test]
    fn manual_read_aloud_round_trips_through_speaking() {
        let speech = Arc::new(MockSpeech::ok());
        let mut controller = ready_controller(
            MockCaptioner::ok("a dog"),
            Arc::clone(&speech) as Arc<dyn SpeechSynth>,
            false,
        );

        controller
            .request(Command::SelectImage("dog.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");
        let events = wait_for_state(&mut controller, AppState::CaptionReady);

        // auto_read_aloud off: no speech was dispatched with the caption.
        assert!(events.contains(&ControllerEvent::CaptionGenerated {
            caption: "a dog".into(),
            speaking: false,
        }));
        assert!(speech.spoken().is_empty());

        controller.request(Command::ReadAloud).expect("accepted");
        assert_eq!(controller.state(), AppState::Speaking);

        let events = wait_for_state(&mut controller, AppState::CaptionReady);
        assert!(events.contains(&ControllerEvent::SpeechFinished));
        assert_eq!(speech.spoken(), vec!["a dog"]);
    }

    #[test]
    fn speech_failure_returns_to_caption_ready_with_caption_intact() {
        let mut controller = ready_controller(
            MockCaptioner::ok("a cat"),
            Arc::new(MockSpeech::err(SpeechError::EngineUnavailable(
                "no backend".into(),
            ))),
            true,
        );

        controller
            .request(Command::SelectImage("cat.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");

        let events = wait_for_state(&mut controller, AppState::CaptionReady);
        assert!(events
            .iter()
            .any(|e| matches!(e, ControllerEvent::SpeechFailed(msg) if msg.contains("no backend"))));
        assert_eq!(controller.session().caption(), Some("a cat"));
        assert!(controller.can_read_aloud());
    }

    #[test]
    fn selecting_new_image_clears_caption_before_recaptioning() {
        let mut controller = ready_controller(
            MockCaptioner::ok("first caption"),
            Arc::new(MockSpeech::ok()),
            false,
        );

        controller
            .request(Command::SelectImage("a.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");
        wait_for_state(&mut controller, AppState::CaptionReady);

        controller
            .request(Command::SelectImage("b.jpg".into()))
            .expect("accepted");

        assert_eq!(controller.state(), AppState::ImageLoaded);
        assert!(controller.session().caption().is_none());
        assert!(!controller.can_read_aloud());
        assert!(!controller.can_export());
    }

    // -----------------------------------------------------------------------
    // Stale completions (fed synthetically through on_task_complete)
    // -----------------------------------------------------------------------

    #[test]
    fn caption_completion_for_replaced_image_is_discarded() {
        let mut controller = ready_controller(
            MockCaptioner::ok_after("old caption", Duration::from_millis(200)),
            Arc::new(MockSpeech::ok()),
            true,
        );

        controller
            .request(Command::SelectImage("a.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");

        // The user picks a different image while the old caption is in flight.
        controller
            .request(Command::SelectImage("b.jpg".into()))
            .expect("accepted");
        assert_eq!(controller.state(), AppState::ImageLoaded);

        // Let the stale completion arrive; it must not be applied.
        std::thread::sleep(Duration::from_millis(300));
        let events = controller.poll();
        assert!(events.is_empty());
        assert_eq!(controller.state(), AppState::ImageLoaded);
        assert!(controller.session().caption().is_none());
    }

    #[test]
    fn caption_completion_with_old_epoch_is_discarded_even_in_captioning() {
        let mut controller = ready_controller(
            MockCaptioner::ok("fresh caption"),
            Arc::new(MockSpeech::ok()),
            false,
        );

        controller
            .request(Command::SelectImage("a.jpg".into()))
            .expect("accepted");
        let old_epoch = controller.session().epoch();
        controller
            .request(Command::SelectImage("b.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");
        assert_eq!(controller.state(), AppState::Captioning);

        // A completion tagged with the superseded epoch must be ignored.
        let event = controller.on_task_complete(TaskOutcome::CaptionGenerated {
            epoch: old_epoch,
            result: Ok("stale caption".into()),
        });
        assert!(event.is_none());
        assert_eq!(controller.state(), AppState::Captioning);
        assert!(controller.session().caption().is_none());

        wait_for_state(&mut controller, AppState::CaptionReady);
        assert_eq!(controller.session().caption(), Some("fresh caption"));
    }

    #[test]
    fn speech_completion_after_image_change_is_discarded() {
        let mut controller = ready_controller(
            MockCaptioner::ok("x"),
            Arc::new(MockSpeech::ok()),
            false,
        );
        controller
            .request(Command::SelectImage("a.jpg".into()))
            .expect("accepted");

        let event = controller.on_task_complete(TaskOutcome::SpeechFinished(Ok(())));
        assert!(event.is_none());
        assert_eq!(controller.state(), AppState::ImageLoaded);
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    #[test]
    fn export_writes_current_caption() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("photo_caption.txt");

        let mut controller = ready_controller(
            MockCaptioner::ok("a red square"),
            Arc::new(MockSpeech::ok()),
            false,
        );
        controller
            .request(Command::SelectImage("photo.jpg".into()))
            .expect("accepted");
        controller
            .request(Command::GenerateCaption)
            .expect("accepted");
        wait_for_state(&mut controller, AppState::CaptionReady);

        controller
            .request(Command::Export(dest.clone()))
            .expect("export accepted");

        let content = std::fs::read_to_string(&dest).expect("read back");
        assert_eq!(content, "a red square");
        // Export leaves the state machine untouched.
        assert_eq!(controller.state(), AppState::CaptionReady);
    }

    #[test]
    fn export_rejected_without_caption() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut controller =
            ready_controller(MockCaptioner::ok("x"), Arc::new(MockSpeech::ok()), false);
        controller
            .request(Command::SelectImage("photo.jpg".into()))
            .expect("accepted");

        let err = controller
            .request(Command::Export(dir.path().join("caption.txt")))
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Rejected(CommandRejected::NoCaption)
        ));
    }
}
