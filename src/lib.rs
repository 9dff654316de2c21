//! Accessible Image Captioner — offline image captioning with spoken output.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  Command   ┌──────────────────┐  dispatch   ┌──────────────┐
//! │ CaptionerApp  │──────────▶│ StateController   │───────────▶│ TaskRunner    │
//! │ (egui, UI     │           │ (state machine +  │            │ (one thread   │
//! │  thread)      │◀──────────│  Session)         │◀───────────│  per task)    │
//! └───────────────┘  events   └──────────────────┘  outcomes   └──────┬───────┘
//!                                                                     │
//!                                        ┌────────────────────────────┴──┐
//!                                        ▼                               ▼
//!                              CaptionEngine (BLIP)            SpeechSynth (OS TTS)
//! ```
//!
//! The orchestrator keeps the UI thread non-blocking: model loading, caption
//! inference, and speech playback each run on a single-use worker thread and
//! report back through one completion channel, drained every frame.

pub mod app;
pub mod caption;
pub mod config;
pub mod export;
pub mod orchestrator;
pub mod speech;
