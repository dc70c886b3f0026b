//! HTTP clients for the external speech and language providers
//!
//! One client per provider leg:
//! - Transcription (STT): one synchronous request per completed utterance
//! - Chat (LLM): streaming token deltas plus a non-streaming summary path
//! - Synthesis (TTS): text in, raw linear PCM out
//!
//! All clients surface failures as `ProviderError` values; the pipeline
//! decides how to degrade. Nothing here retries.

pub mod llm;
pub mod stt;
pub mod tts;

use thiserror::Error;

/// Provider-facing error type
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

pub use llm::{ChatClient, ChatConfig, ChatOutcome};
pub use stt::{TranscriptionClient, TranscriptionConfig, TranscriptOutcome};
pub use tts::{SynthesisClient, SynthesisConfig};
