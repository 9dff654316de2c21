//! BLIP model file resolution.
//!
//! Three sources, checked in this order:
//!
//! 1. An explicit local directory (`CaptionConfig::model_dir`) holding
//!    `model.safetensors` and `tokenizer.json` — fully offline, and an
//!    error if the files are missing.
//! 2. The application's own models directory (`AppPaths::models_dir`) —
//!    a drop-in location for users who pre-download the files.
//! 3. The Hugging Face hub via `hf-hub`, which downloads on first run and
//!    serves from its on-disk cache afterwards.

use std::path::{Path, PathBuf};

use crate::caption::engine::CaptionError;
use crate::config::{AppPaths, CaptionConfig};

/// File name of the model weights inside a local model directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// File name of the tokenizer definition inside a local model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Resolved on-disk locations of the captioning model's files.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Safetensors weights.
    pub weights: PathBuf,
    /// `tokenizer.json` for the text decoder.
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    /// Resolve model files per `config` (local dir, app models dir, hub).
    ///
    /// # Errors
    ///
    /// - [`CaptionError::ModelNotFound`] — a configured local directory is
    ///   missing one of the expected files.
    /// - [`CaptionError::Fetch`] — the hub download failed.
    pub fn resolve(config: &CaptionConfig) -> Result<Self, CaptionError> {
        if let Some(dir) = &config.model_dir {
            return Self::from_dir(dir);
        }

        // A model dropped into the app's data dir wins over the hub.
        let models_dir = AppPaths::new().models_dir;
        if let Ok(files) = Self::from_dir(&models_dir) {
            log::info!("using local model files in {}", models_dir.display());
            return Ok(files);
        }

        Self::fetch(&config.model_id)
    }

    /// Expect `model.safetensors` and `tokenizer.json` directly in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, CaptionError> {
        let weights = dir.join(WEIGHTS_FILE);
        let tokenizer = dir.join(TOKENIZER_FILE);

        for path in [&weights, &tokenizer] {
            if !path.exists() {
                return Err(CaptionError::ModelNotFound(path.display().to_string()));
            }
        }

        Ok(Self { weights, tokenizer })
    }

    /// Download (or reuse the cached copy of) the model from the hub.
    fn fetch(model_id: &str) -> Result<Self, CaptionError> {
        log::info!("resolving captioning model from hub: {model_id}");

        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| CaptionError::Fetch(e.to_string()))?;
        let repo = api.model(model_id.to_string());

        let weights = repo
            .get(WEIGHTS_FILE)
            .map_err(|e| CaptionError::Fetch(format!("{model_id}/{WEIGHTS_FILE}: {e}")))?;
        let tokenizer = repo
            .get(TOKENIZER_FILE)
            .map_err(|e| CaptionError::Fetch(format!("{model_id}/{TOKENIZER_FILE}: {e}")))?;

        Ok(Self { weights, tokenizer })
    }
}
