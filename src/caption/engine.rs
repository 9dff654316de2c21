//! Core captioning trait and the BLIP implementation.
//!
//! # Overview
//!
//! [`CaptionEngine`] is the public interface used by the orchestrator.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn CaptionEngine>` and called from a worker thread.
//!
//! [`BlipCaptioner`] is the production implementation: a BLIP
//! vision-language model run locally through `candle`.  Construct it with
//! [`BlipCaptioner::load`] — this is the slow, blocking model-load step that
//! the orchestrator dispatches off the UI thread at startup.
//!
//! [`MockCaptioner`] (available under `#[cfg(test)]`) is a zero-dependency
//! stub that returns a pre-configured response — useful for unit-testing the
//! orchestrator without model weights on disk.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::ops::log_softmax;
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip;
use thiserror::Error;
use tokenizers::Tokenizer;

use crate::caption::generate::GenerateParams;
use crate::caption::image::load_image_tensor;
use crate::caption::model::ModelFiles;
use crate::config::CaptionConfig;

/// Placeholder emitted by [`CaptionEngine::generate_many`] for items that
/// failed; the batch itself never fails.
pub const UNABLE_TO_CAPTION: &str = "Unable to generate caption";

/// Start-of-decoding token prepended to every caption ([DEC] in BLIP).
const BOS_TOKEN_ID: u32 = 30_522;
/// BERT [SEP] token — terminates generation.
const SEP_TOKEN_ID: u32 = 102;

// ---------------------------------------------------------------------------
// CaptionError
// ---------------------------------------------------------------------------

/// All errors that can arise from the captioning subsystem.
#[derive(Debug, Clone, Error)]
pub enum CaptionError {
    /// The image file could not be opened or decoded, or could not be
    /// converted to 3-channel RGB.
    #[error("Image could not be decoded: {0}")]
    Decode(String),

    /// Model files were not found at the configured local directory.
    #[error("Model files not found: {0}")]
    ModelNotFound(String),

    /// Downloading the model from the hub failed.
    #[error("Model download failed: {0}")]
    Fetch(String),

    /// The weights could not be loaded into a model instance.
    #[error("Model initialisation failed: {0}")]
    ModelInit(String),

    /// The tokenizer failed to load or to decode the generated ids.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// An error occurred during the inference pass.
    #[error("Caption inference failed: {0}")]
    Inference(String),

    /// Decoding terminated without producing any text.
    #[error("Model produced an empty caption")]
    EmptyCaption,

    /// Internal / unexpected error (e.g. a poisoned lock or worker panic).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<candle_core::Error> for CaptionError {
    fn from(e: candle_core::Error) -> Self {
        CaptionError::Inference(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// CaptionEngine trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for image captioning engines.
///
/// Implementations must be `Send + Sync` so that they can be held behind an
/// `Arc<dyn CaptionEngine>` and called from any thread.
///
/// # Contract
///
/// - On success the caption is non-empty, trimmed text.
/// - Non-RGB inputs (grayscale, palette, RGBA, …) are normalised to RGB
///   before inference, never rejected for their color mode alone.
pub trait CaptionEngine: Send + Sync {
    /// Generate a caption for the image at `image_path`.
    fn generate(&self, image_path: &Path, params: &GenerateParams)
        -> Result<String, CaptionError>;

    /// Caption a batch of images.
    ///
    /// Never fails outright: items that error degrade to
    /// [`UNABLE_TO_CAPTION`], and the returned vector always has the same
    /// length as `image_paths`.
    fn generate_many(&self, image_paths: &[PathBuf], params: &GenerateParams) -> Vec<String> {
        image_paths
            .iter()
            .map(|path| match self.generate(path, params) {
                Ok(caption) => caption,
                Err(e) => {
                    log::warn!("captioning {} failed: {e}", path.display());
                    UNABLE_TO_CAPTION.to_string()
                }
            })
            .collect()
    }
}

// Compile-time assertion: Box<dyn CaptionEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn CaptionEngine>) {}
};

// ---------------------------------------------------------------------------
// BlipCaptioner
// ---------------------------------------------------------------------------

/// Production captioning engine wrapping a BLIP conditional-generation model.
///
/// The model's text decoder keeps a KV cache between forward calls, so the
/// model sits behind a `Mutex` and each [`generate`] call resets the cache
/// before decoding.  The orchestrator dispatches at most one caption task at
/// a time, so the lock is uncontended in practice.
///
/// [`generate`]: CaptionEngine::generate
pub struct BlipCaptioner {
    model: Mutex<blip::BlipForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for BlipCaptioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipCaptioner")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl BlipCaptioner {
    /// Resolve model files per `config`, then load weights and tokenizer.
    ///
    /// Blocking and slow (hundreds of MB of weights) — run off the UI thread.
    ///
    /// # Errors
    ///
    /// - [`CaptionError::ModelNotFound`] / [`CaptionError::Fetch`] — file
    ///   resolution failed.
    /// - [`CaptionError::Tokenizer`] — `tokenizer.json` is unreadable.
    /// - [`CaptionError::ModelInit`] — the weights do not form a BLIP model.
    pub fn load(config: &CaptionConfig) -> Result<Self, CaptionError> {
        let files = ModelFiles::resolve(config)?;
        let device = select_device(config.use_gpu);

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| CaptionError::Tokenizer(e.to_string()))?;

        let blip_config = blip::Config::image_captioning_large();

        // SAFETY: the weights file is memory-mapped read-only and is not
        // modified for the lifetime of the mapping.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights.clone()], DType::F32, &device)
        }
        .map_err(|e| CaptionError::ModelInit(e.to_string()))?;

        let model = blip::BlipForConditionalGeneration::new(&blip_config, vb)
            .map_err(|e| CaptionError::ModelInit(e.to_string()))?;

        log::info!(
            "BLIP model loaded ({} on {:?})",
            files.weights.display(),
            device
        );

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
        })
    }
}

impl CaptionEngine for BlipCaptioner {
    fn generate(
        &self,
        image_path: &Path,
        params: &GenerateParams,
    ) -> Result<String, CaptionError> {
        let pixels = load_image_tensor(image_path, &self.device)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| CaptionError::Internal("model lock poisoned".into()))?;

        model.reset_kv_cache();
        let image_embeds = pixels.unsqueeze(0)?.apply(model.vision_model())?;

        let token_ids = if params.beam_width <= 1 {
            greedy_decode(&mut model, &image_embeds, &self.device, params)?
        } else {
            beam_decode(&mut model, &image_embeds, &self.device, params)?
        };

        let caption = self
            .tokenizer
            .decode(&token_ids, true)
            .map_err(|e| CaptionError::Tokenizer(e.to_string()))?;

        let caption = caption.trim().to_string();
        if caption.is_empty() {
            return Err(CaptionError::EmptyCaption);
        }

        log::debug!("caption for {}: {caption:?}", image_path.display());
        Ok(caption)
    }
}

/// Pick the inference device: CUDA when requested and available, CPU
/// otherwise.
fn select_device(use_gpu: bool) -> Device {
    if use_gpu {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => log::warn!("CUDA unavailable ({e}), falling back to CPU"),
        }
    }
    Device::Cpu
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Greedy decoding with the decoder's incremental KV cache: after the first
/// step only the newest token is fed per forward pass.
fn greedy_decode(
    model: &mut blip::BlipForConditionalGeneration,
    image_embeds: &Tensor,
    device: &Device,
    params: &GenerateParams,
) -> Result<Vec<u32>, CaptionError> {
    let mut logits_processor = LogitsProcessor::new(params.seed, None, None);
    let mut token_ids: Vec<u32> = vec![BOS_TOKEN_ID];

    // max_length counts the start token, so at most max_length - 1 steps.
    for index in 0..params.max_length.saturating_sub(1) {
        let context_size = if index > 0 { 1 } else { token_ids.len() };
        let start_pos = token_ids.len().saturating_sub(context_size);

        let input_ids = Tensor::new(&token_ids[start_pos..], device)?.unsqueeze(0)?;
        let logits = model.text_decoder().forward(&input_ids, image_embeds)?;
        let logits = logits.squeeze(0)?;
        let logits = logits.get(logits.dim(0)? - 1)?;

        let token = logits_processor.sample(&logits)?;
        if token == SEP_TOKEN_ID {
            break;
        }
        token_ids.push(token);
    }

    Ok(token_ids)
}

/// A beam-search hypothesis: generated ids plus cumulative log-probability.
struct Hypothesis {
    tokens: Vec<u32>,
    score: f32,
}

/// Beam search over the text decoder.
///
/// The KV cache is reset before every forward pass and each hypothesis is
/// re-run in full — the cache is positional state that cannot be shared
/// between hypotheses.  Hypotheses end when they emit [SEP]; the best
/// finished hypothesis under length-normalised score wins.
fn beam_decode(
    model: &mut blip::BlipForConditionalGeneration,
    image_embeds: &Tensor,
    device: &Device,
    params: &GenerateParams,
) -> Result<Vec<u32>, CaptionError> {
    let width = params.beam_width;
    let mut beams = vec![Hypothesis {
        tokens: vec![BOS_TOKEN_ID],
        score: 0.0,
    }];
    let mut finished: Vec<Hypothesis> = Vec::new();

    while !beams.is_empty() && beams[0].tokens.len() < params.max_length {
        let mut candidates: Vec<Hypothesis> = Vec::new();

        for hyp in &beams {
            model.reset_kv_cache();
            let input_ids = Tensor::new(hyp.tokens.as_slice(), device)?.unsqueeze(0)?;
            let logits = model.text_decoder().forward(&input_ids, image_embeds)?;
            let logits = logits.squeeze(0)?;
            let last = logits.get(logits.dim(0)? - 1)?;
            let log_probs = log_softmax(&last, D::Minus1)?.to_vec1::<f32>()?;

            for (token, log_prob) in top_k(&log_probs, width) {
                let score = hyp.score + log_prob;
                if token == SEP_TOKEN_ID {
                    finished.push(Hypothesis {
                        tokens: hyp.tokens.clone(),
                        score,
                    });
                } else {
                    let mut tokens = hyp.tokens.clone();
                    tokens.push(token);
                    candidates.push(Hypothesis { tokens, score });
                }
            }
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        candidates.truncate(width);
        beams = candidates;

        if finished.len() >= width {
            break;
        }
    }

    model.reset_kv_cache();

    // Hypotheses still open at max_length compete with the finished ones.
    finished.extend(beams);
    let best = finished
        .into_iter()
        .max_by(|a, b| {
            let a_norm = a.score / a.tokens.len() as f32;
            let b_norm = b.score / b.tokens.len() as f32;
            a_norm.partial_cmp(&b_norm).unwrap_or(Ordering::Equal)
        })
        .ok_or(CaptionError::EmptyCaption)?;

    Ok(best.tokens)
}

/// Indices and values of the `k` largest entries, descending.
fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .map(|(i, &lp)| (i as u32, lp))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    indexed.truncate(k);
    indexed
}

// ---------------------------------------------------------------------------
// MockCaptioner  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured response without loading any
/// model weights.
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockCaptioner::ok("a red square");
/// let caption = engine.generate(Path::new("photo.jpg"), &GenerateParams::default());
/// assert_eq!(caption.unwrap(), "a red square");
/// ```
#[cfg(test)]
pub struct MockCaptioner {
    response: Result<String, CaptionError>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl MockCaptioner {
    /// Create a mock that always returns `Ok(text)`.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            delay: None,
        }
    }

    /// Create a mock that always returns `Err(error)`.
    pub fn err(error: CaptionError) -> Self {
        Self {
            response: Err(error),
            delay: None,
        }
    }

    /// Create a mock that sleeps for `delay` before returning `Ok(text)`,
    /// for exercising in-flight states.
    pub fn ok_after(text: impl Into<String>, delay: std::time::Duration) -> Self {
        Self {
            response: Ok(text.into()),
            delay: Some(delay),
        }
    }
}

#[cfg(test)]
impl CaptionEngine for MockCaptioner {
    fn generate(
        &self,
        _image_path: &Path,
        _params: &GenerateParams,
    ) -> Result<String, CaptionError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
