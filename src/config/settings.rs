//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// CaptionConfig
// ---------------------------------------------------------------------------

/// Settings for the BLIP captioning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Hugging Face model identifier for the BLIP captioning checkpoint.
    pub model_id: String,
    /// Local directory containing `model.safetensors` and `tokenizer.json`.
    ///
    /// When set, the hub is never contacted — fully offline operation.
    /// `None` means fetch (and cache) via `hf-hub` on first run.
    pub model_dir: Option<std::path::PathBuf>,
    /// Maximum caption length in tokens, including the start token.
    pub max_length: usize,
    /// Number of beam-search hypotheses. `1` selects greedy decoding.
    pub beam_width: usize,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            model_id: "Salesforce/blip-image-captioning-large".into(),
            model_dir: None,
            max_length: 50,
            beam_width: 4,
            use_gpu: false,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the text-to-speech engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speaking rate, normalized 0.0 (slowest) – 1.0 (fastest).
    ///
    /// Mapped onto the platform engine's native rate range; 0.5 is the
    /// engine's normal rate.
    pub rate: f32,
    /// Playback volume, normalized 0.0 – 1.0.
    pub volume: f32,
    /// Speak every freshly generated caption automatically.
    pub auto_read_aloud: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 0.5,
            volume: 0.9,
            auto_read_aloud: true,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// egui window appearance and behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Start in the yellow-on-black high-contrast palette.
    pub high_contrast: bool,
    /// Initial window size `(width, height)` in logical pixels.
    pub window_size: (f32, f32),
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            high_contrast: false,
            window_size: (900.0, 700.0),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use image_captioner::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Captioning engine settings.
    pub caption: CaptionConfig,
    /// Text-to-speech settings.
    pub speech: SpeechConfig,
    /// Window settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
