//! Accessible Image Captioner — egui/eframe application.
//!
//! # Architecture
//!
//! [`CaptionerApp`] is the top-level [`eframe::App`].  It owns the
//! [`StateController`] and drives it from the UI thread:
//!
//! * user interactions become [`Command`]s sent through
//!   `StateController::request`,
//! * every frame drains `StateController::poll` and turns
//!   [`ControllerEvent`]s into status-line updates and notices.
//!
//! Enabled/disabled button states come straight from the controller's
//! affordance queries, so the UI can never issue a command the state machine
//! would not accept via a button (keyboard shortcuts still go through the
//! same validation and surface rejections as warnings).
//!
//! # Accessibility
//!
//! Mirrors of the tool's accessibility behaviours live here: large layout,
//! keyboard shortcuts for every action, drag-and-drop image selection, and
//! a yellow-on-black high-contrast palette (Ctrl+H).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use eframe::egui;

use crate::config::AppConfig;
use crate::export;
use crate::orchestrator::{Command, ControllerError, ControllerEvent, StateController};

/// File extensions offered by the image picker.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff"];

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// Severity of a [`Notice`], controls the accent colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A dismissible modal-style message shown over the main panel.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn info(title: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.to_string(),
            message: message.into(),
        }
    }

    fn warning(title: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: title.to_string(),
            message: message.into(),
        }
    }

    fn error(title: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptionerApp
// ---------------------------------------------------------------------------

/// eframe application — the captioner main window.
pub struct CaptionerApp {
    /// State machine, session, and task dispatch.
    controller: StateController,
    /// Application configuration (read-only after startup).
    config: AppConfig,

    // ── Presentation state ───────────────────────────────────────────────
    /// Current status-line text.
    status: String,
    /// Pending notices; the front one is displayed until dismissed.
    notices: VecDeque<Notice>,
    /// Yellow-on-black palette active.
    high_contrast: bool,
    /// Palette last pushed to the egui context; avoids re-applying visuals
    /// every frame.
    applied_contrast: Option<bool>,
    /// Decoded preview of the selected image.
    preview: Option<egui::TextureHandle>,
}

impl CaptionerApp {
    /// Create the app around an already-started controller (the model load
    /// task is dispatched by `main` before the event loop starts).
    pub fn new(controller: StateController, config: AppConfig) -> Self {
        let high_contrast = config.ui.high_contrast;
        Self {
            controller,
            config,
            status: "Loading model, please wait...".to_string(),
            notices: VecDeque::new(),
            high_contrast,
            applied_contrast: None,
            preview: None,
        }
    }

    // ── Command plumbing ─────────────────────────────────────────────────

    /// Send a command to the controller, surfacing failures as notices.
    /// Returns `true` when the command was accepted.
    fn issue(&mut self, command: Command) -> bool {
        match self.controller.request(command) {
            Ok(()) => true,
            Err(ControllerError::Rejected(rejection)) => {
                self.notices
                    .push_back(Notice::warning("Command unavailable", rejection.to_string()));
                false
            }
            Err(ControllerError::Export(e)) => {
                self.notices
                    .push_back(Notice::error("Export Error", e.to_string()));
                false
            }
        }
    }

    /// Open the native file picker and select the chosen image.
    fn select_image_dialog(&mut self, ctx: &egui::Context) {
        let picked = rfd::FileDialog::new()
            .set_title("Select an Image")
            .add_filter("Image files", IMAGE_EXTENSIONS)
            .pick_file();

        if let Some(path) = picked {
            self.select_image(ctx, path);
        }
    }

    /// Route an image path (picker or drag-and-drop) through the controller.
    fn select_image(&mut self, ctx: &egui::Context, path: PathBuf) {
        if self.issue(Command::SelectImage(path.clone())) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            self.status = format!("Image loaded: {name}");
            self.load_preview(ctx, &path);
        }
    }

    fn generate_caption(&mut self) {
        if self.issue(Command::GenerateCaption) {
            self.status = "Generating caption...".to_string();
        }
    }

    fn read_aloud(&mut self) {
        if self.issue(Command::ReadAloud) {
            self.status = "Reading caption aloud...".to_string();
        }
    }

    /// Ask for a destination and export the caption.
    fn export_caption(&mut self) {
        if !self.controller.can_export() {
            self.notices.push_back(Notice::warning(
                "No Caption",
                "Please generate a caption first.",
            ));
            return;
        }

        let suggested = export::suggested_file_name(self.controller.session().image());
        let picked = rfd::FileDialog::new()
            .set_title("Export Caption")
            .set_file_name(&suggested)
            .add_filter("Text files", &["txt"])
            .save_file();

        if let Some(dest) = picked {
            if self.issue(Command::Export(dest.clone())) {
                let name = dest
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dest.display().to_string());
                self.status = format!("Caption exported to {name}");
                self.notices.push_back(Notice::info(
                    "Success",
                    format!("Caption exported to:\n{}", dest.display()),
                ));
            }
        }
    }

    fn toggle_contrast(&mut self) {
        if self.issue(Command::ToggleContrast) {
            self.high_contrast = !self.high_contrast;
            self.status = if self.high_contrast {
                "High contrast mode enabled".to_string()
            } else {
                "Normal mode enabled".to_string()
            };
        }
    }

    // ── Frame input handling ─────────────────────────────────────────────

    /// Keyboard shortcuts: Ctrl+O/G/R/S/H/Q.
    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let ctrl = egui::Modifiers::CTRL;

        if ctx.input_mut(|i| i.consume_key(ctrl, egui::Key::O)) {
            self.select_image_dialog(ctx);
        }
        if ctx.input_mut(|i| i.consume_key(ctrl, egui::Key::G)) {
            self.generate_caption();
        }
        if ctx.input_mut(|i| i.consume_key(ctrl, egui::Key::R)) {
            self.read_aloud();
        }
        if ctx.input_mut(|i| i.consume_key(ctrl, egui::Key::S)) {
            self.export_caption();
        }
        if ctx.input_mut(|i| i.consume_key(ctrl, egui::Key::H)) {
            self.toggle_contrast();
        }
        if ctx.input_mut(|i| i.consume_key(ctrl, egui::Key::Q)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    /// Drag-and-drop: first dropped file with a path becomes the selection.
    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(path) = dropped.into_iter().find_map(|f| f.path) {
            self.select_image(ctx, path);
        }
    }

    /// Turn controller events into status text and notices.
    fn apply_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::ModelReady => {
                self.status = "Model loaded successfully! Select an image to begin.".to_string();
                self.notices.push_back(Notice::info(
                    "Ready",
                    "Image captioning model loaded successfully!",
                ));
            }
            ControllerEvent::ModelLoadFailed(message) => {
                self.status = "Failed to load model. Please restart the application.".to_string();
                self.notices.push_back(Notice::error(
                    "Model Error",
                    format!("Failed to load captioning model:\n{message}"),
                ));
            }
            ControllerEvent::CaptionGenerated { speaking, .. } => {
                self.status = if speaking {
                    "Caption generated — reading aloud...".to_string()
                } else {
                    "Caption generated successfully!".to_string()
                };
            }
            ControllerEvent::CaptionFailed(message) => {
                self.status = "Caption generation failed".to_string();
                self.notices.push_back(Notice::error(
                    "Error",
                    format!("Caption generation failed:\n{message}"),
                ));
            }
            ControllerEvent::SpeechFinished => {
                self.status = "Caption ready".to_string();
            }
            ControllerEvent::SpeechFailed(message) => {
                self.status = "Caption ready (speech failed)".to_string();
                self.notices.push_back(Notice::error(
                    "Speech Error",
                    format!("Failed to read aloud:\n{message}"),
                ));
            }
        }
    }

    // ── Preview ──────────────────────────────────────────────────────────

    /// Decode a display thumbnail for the selected image (best effort — a
    /// broken file still captions through the engine's own error path).
    fn load_preview(&mut self, ctx: &egui::Context, path: &Path) {
        match image::open(path) {
            Ok(img) => {
                let thumb = img.thumbnail(600, 400).to_rgb8();
                let size = [thumb.width() as usize, thumb.height() as usize];
                let color = egui::ColorImage::from_rgb(size, thumb.as_raw());
                self.preview =
                    Some(ctx.load_texture("preview", color, egui::TextureOptions::LINEAR));
            }
            Err(e) => {
                log::warn!("preview decode failed for {}: {e}", path.display());
                self.preview = None;
            }
        }
    }

    // ── Styling ──────────────────────────────────────────────────────────

    fn apply_visuals(&mut self, ctx: &egui::Context) {
        if self.applied_contrast == Some(self.high_contrast) {
            return;
        }
        self.applied_contrast = Some(self.high_contrast);

        if self.high_contrast {
            let mut visuals = egui::Visuals::dark();
            visuals.override_text_color = Some(egui::Color32::YELLOW);
            visuals.panel_fill = egui::Color32::BLACK;
            visuals.window_fill = egui::Color32::from_rgb(26, 26, 26);
            ctx.set_visuals(visuals);
        } else {
            ctx.set_visuals(egui::Visuals::light());
        }
    }

    fn notice_color(&self, level: NoticeLevel) -> egui::Color32 {
        match level {
            NoticeLevel::Info => egui::Color32::from_rgb(80, 200, 120),
            NoticeLevel::Warning => egui::Color32::from_rgb(230, 160, 30),
            NoticeLevel::Error => egui::Color32::from_rgb(220, 70, 70),
        }
    }

    // ── Panels ───────────────────────────────────────────────────────────

    fn draw_menu(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open Image (Ctrl+O)").clicked() {
                    ui.close_menu();
                    self.select_image_dialog(ctx);
                }
                if ui.button("Export Caption (Ctrl+S)").clicked() {
                    ui.close_menu();
                    self.export_caption();
                }
                ui.separator();
                if ui.button("Exit (Ctrl+Q)").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
            ui.menu_button("View", |ui| {
                if ui.button("Toggle High Contrast (Ctrl+H)").clicked() {
                    ui.close_menu();
                    self.toggle_contrast();
                }
            });
            ui.menu_button("Help", |ui| {
                if ui.button("About").clicked() {
                    ui.close_menu();
                    self.notices.push_back(Notice::info(
                        "About",
                        "Accessible Image Captioner\n\n\
                         An offline desktop tool for generating image captions \
                         with text-to-speech support.\n\n\
                         Model: BLIP image captioning (local inference)",
                    ));
                }
                if ui.button("Keyboard Shortcuts").clicked() {
                    ui.close_menu();
                    self.notices.push_back(Notice::info(
                        "Keyboard Shortcuts",
                        "Ctrl+O - Select Image\n\
                         Ctrl+G - Generate Caption\n\
                         Ctrl+R - Read Aloud\n\
                         Ctrl+S - Export Caption\n\
                         Ctrl+H - Toggle High Contrast\n\
                         Ctrl+Q - Quit Application",
                    ));
                }
            });
        });
    }

    fn draw_image_area(&mut self, ui: &mut egui::Ui) {
        egui::Frame::group(ui.style())
            .inner_margin(egui::Margin::same(12))
            .show(ui, |ui| {
                ui.set_min_height(260.0);
                ui.centered_and_justified(|ui| match &self.preview {
                    Some(texture) => {
                        ui.add(
                            egui::Image::new(texture)
                                .max_size(egui::vec2(600.0, 400.0))
                                .maintain_aspect_ratio(true),
                        );
                    }
                    None => {
                        let hint = if self.controller.session().image().is_some() {
                            "Preview unavailable for this file"
                        } else {
                            "No image selected\n\nDrag & drop an image here or click 'Select Image'"
                        };
                        ui.label(egui::RichText::new(hint).size(14.0));
                    }
                });
            });
    }

    fn draw_caption_area(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("Generated Caption:").strong());
        let mut caption = self
            .controller
            .session()
            .caption()
            .unwrap_or_default()
            .to_string();
        ui.add(
            egui::TextEdit::multiline(&mut caption)
                .desired_rows(3)
                .desired_width(f32::INFINITY)
                .interactive(false)
                .font(egui::TextStyle::Heading),
        );
    }

    fn draw_buttons(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui
                .add_enabled(
                    self.controller.can_select_image(),
                    egui::Button::new("Select Image (Ctrl+O)"),
                )
                .clicked()
            {
                self.select_image_dialog(ctx);
            }
            if ui
                .add_enabled(
                    self.controller.can_generate_caption(),
                    egui::Button::new("Generate Caption (Ctrl+G)"),
                )
                .clicked()
            {
                self.generate_caption();
            }
            if ui
                .add_enabled(
                    self.controller.can_read_aloud(),
                    egui::Button::new("Read Aloud (Ctrl+R)"),
                )
                .clicked()
            {
                self.read_aloud();
            }
            if ui
                .add_enabled(
                    self.controller.can_export(),
                    egui::Button::new("Export Alt-Text (Ctrl+S)"),
                )
                .clicked()
            {
                self.export_caption();
            }
        });
    }

    fn draw_status(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.controller.state().is_busy() {
                ui.spinner();
            }
            ui.label(&self.status);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak(self.controller.state().label());
            });
        });
    }

    /// Show the front notice as a centred dismissible window.
    fn draw_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notices.front().cloned() else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new(&notice.title)
            .id(egui::Id::new("notice"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(
                    egui::RichText::new(&notice.message)
                        .color(self.notice_color(notice.level)),
                );
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });

        if dismissed {
            self.notices.pop_front();
        }
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for CaptionerApp {
    /// Called every frame by eframe.  Polls the controller, handles input,
    /// then renders the window.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_visuals(ctx);

        // --- Poll completions ----------------------------------------------
        for event in self.controller.poll() {
            self.apply_event(event);
        }

        // --- Input ----------------------------------------------------------
        self.handle_shortcuts(ctx);
        self.handle_dropped_files(ctx);

        // --- Keep polling while background work is outstanding -------------
        if self.controller.state().is_busy() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        // --- Layout ---------------------------------------------------------
        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            self.draw_menu(ctx, ui);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.draw_status(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("Accessible Image Captioner");
            });
            ui.add_space(8.0);
            self.draw_image_area(ui);
            ui.add_space(8.0);
            self.draw_caption_area(ui);
            ui.add_space(8.0);
            self.draw_buttons(ctx, ui);
        });

        self.draw_notice(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Persist the contrast preference (best-effort).
        let mut config = self.config.clone();
        config.ui.high_contrast = self.high_contrast;
        if let Err(e) = config.save() {
            log::warn!("could not save settings on exit: {e}");
        }
        log::info!("Accessible Image Captioner closing");
    }
}
