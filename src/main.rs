//! Application entry point — Accessible Image Captioner.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the speech synthesizer ([`NativeSpeech`]) from config.
//! 4. Create the [`StateController`] and dispatch the model-load task —
//!    the BLIP weights load (and, on first run, download) on a worker
//!    thread while the window is already up and responsive.
//! 5. Run [`eframe::run_native`] — blocks the main thread until the window
//!    is closed.

use std::sync::Arc;

use image_captioner::{
    app::CaptionerApp,
    caption::{BlipCaptioner, CaptionEngine, GenerateParams},
    config::AppConfig,
    orchestrator::StateController,
    speech::{NativeSpeech, SpeechSynth},
};

use eframe::egui;

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let vp = egui::ViewportBuilder::default()
        .with_inner_size([width, height])
        .with_min_inner_size([640.0, 480.0]);

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Accessible Image Captioner starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Speech synthesizer
    let speech: Arc<dyn SpeechSynth> = Arc::new(NativeSpeech::new(config.speech.clone()));

    // 4. Controller + background model load
    let params = GenerateParams::from_config(&config.caption);
    let mut controller =
        StateController::new(speech, params, config.speech.auto_read_aloud);

    let caption_config = config.caption.clone();
    controller.begin_model_load(move || {
        let engine = BlipCaptioner::load(&caption_config)?;
        Ok(Arc::new(engine) as Arc<dyn CaptionEngine>)
    });

    // 5. Run the egui app (blocks until the window is closed)
    let app = CaptionerApp::new(controller, config.clone());
    let options = native_options(&config);

    eframe::run_native(
        "Accessible Image Captioner",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
}
