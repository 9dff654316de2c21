//! Captioning module — image → natural-language description.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               CaptionEngine (trait)                   │
//! │                                                      │
//! │   ┌─────────────┐    ┌───────────────┐              │
//! │   │  ModelFiles  │    │ BlipCaptioner │              │
//! │   │ - local dir  │───▶│ - model       │              │
//! │   │ - hf-hub     │    │ - tokenizer   │              │
//! │   └─────────────┘    └──────┬────────┘              │
//! │                              │                       │
//! │                              ▼                       │
//! │                    ┌──────────────────┐              │
//! │                    │   generate()     │              │
//! │                    │  image → caption │              │
//! │                    └──────────────────┘              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use image_captioner::caption::{BlipCaptioner, CaptionEngine, GenerateParams};
//! use image_captioner::config::CaptionConfig;
//!
//! let engine = BlipCaptioner::load(&CaptionConfig::default())
//!     .expect("model download or load failed");
//!
//! let params = GenerateParams::default(); // max_length = 50, beam_width = 4
//! let caption = engine
//!     .generate(std::path::Path::new("photo.jpg"), &params)
//!     .unwrap();
//! println!("{caption}");
//! ```

pub mod engine;
pub mod generate;
pub mod image;
pub mod model;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{BlipCaptioner, CaptionEngine, CaptionError, UNABLE_TO_CAPTION};
pub use generate::GenerateParams;
pub use image::{decode_rgb, load_image_tensor, IMAGE_SIZE};
pub use model::{ModelFiles, TOKENIZER_FILE, WEIGHTS_FILE};

// test-only re-export so orchestrator tests can import MockCaptioner without
// `use image_captioner::caption::engine::MockCaptioner`.
#[cfg(test)]
pub use engine::MockCaptioner;
