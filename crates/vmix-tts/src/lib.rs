//! Text-to-speech for VMix voiceovers.
//!
//! This crate provides:
//! - The [`SpeechProvider`] seam and an ElevenLabs-compatible HTTP client
//! - A process-wide [`VoiceMap`] resolving human voice names
//! - [`VoiceGenerator`], which caches synthesized files per task

pub mod client;
pub mod error;
pub mod generator;
pub mod types;
pub mod voices;

pub use client::{ElevenLabsClient, SpeechProvider, TtsConfig};
pub use error::{TtsError, TtsResult};
pub use generator::VoiceGenerator;
pub use types::Voice;
pub use voices::VoiceMap;
