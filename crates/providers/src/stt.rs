//! Transcription (STT) client
//!
//! One synchronous provider request per completed utterance. Utterances
//! shorter than the configured minimum are skipped without a request, and
//! there are no retries: a dropped utterance just means the call keeps
//! listening.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use callbridge_audio::wav_container;

use crate::ProviderError;

/// Transcription provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Provider endpoint accepting containerized audio
    pub url: String,
    /// Bearer token
    pub api_key: String,
    /// BCP-47 language hint
    pub language: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Utterances shorter than this are dropped without a provider call
    pub min_utterance_ms: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081/v1/transcribe".to_string(),
            api_key: String::new(),
            language: "en".to_string(),
            timeout_ms: 10_000,
            min_utterance_ms: 500,
        }
    }
}

/// Result of one transcription attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptOutcome {
    /// Provider returned usable text
    Text(String),
    /// Provider succeeded but heard nothing worth transcribing
    Empty,
    /// Provider could not match the audio (or reported an error status)
    NoMatch,
    /// Utterance was below the minimum duration; no request was made
    TooShort,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    status: String,
    #[serde(default)]
    transcript: Option<String>,
}

/// HTTP transcription client
pub struct TranscriptionClient {
    config: TranscriptionConfig,
    client: Client,
}

impl TranscriptionClient {
    pub fn new(config: TranscriptionConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Minimum utterance length in raw mu-law bytes (8 bytes per ms at 8kHz)
    fn min_bytes(&self) -> usize {
        (self.config.min_utterance_ms * 8) as usize
    }

    /// Transcribe one completed utterance of raw mu-law bytes.
    pub async fn transcribe(&self, utterance: &[u8]) -> Result<TranscriptOutcome, ProviderError> {
        if utterance.len() < self.min_bytes() {
            tracing::debug!(
                bytes = utterance.len(),
                min = self.min_bytes(),
                "utterance too short, skipping transcription"
            );
            return Ok(TranscriptOutcome::TooShort);
        }

        let wav = wav_container(utterance);
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .header("content-type", "audio/wav")
            .query(&[("language", self.config.language.as_str())])
            .body(wav)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: SttResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        match parsed.status.as_str() {
            "ok" | "success" => {
                let text = parsed.transcript.unwrap_or_default();
                let text = text.trim();
                if text.is_empty() {
                    Ok(TranscriptOutcome::Empty)
                } else {
                    Ok(TranscriptOutcome::Text(text.to_string()))
                }
            },
            other => {
                tracing::debug!(status = other, "transcription did not match");
                Ok(TranscriptOutcome::NoMatch)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_short_utterance_skipped_without_request() {
        // 100ms of audio against a 500ms minimum; the unreachable URL would
        // fail the test if a request were attempted
        let client = TranscriptionClient::new(TranscriptionConfig {
            url: "http://127.0.0.1:1/unreachable".to_string(),
            ..Default::default()
        })
        .unwrap();
        let utterance = vec![0xFFu8; 800];
        let outcome = client.transcribe(&utterance).await.unwrap();
        assert_eq!(outcome, TranscriptOutcome::TooShort);
    }

    #[test]
    fn test_min_bytes_follows_config() {
        let client = TranscriptionClient::new(TranscriptionConfig {
            min_utterance_ms: 250,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.min_bytes(), 2000);
    }
}
