//! Speech synthesis (TTS) client
//!
//! POSTs sentence text and receives raw 16-bit little-endian linear PCM at
//! the provider's fixed sample rate. Conversion down to the telephony rate
//! happens in the playback path, not here.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Synthesis provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Provider endpoint
    pub url: String,
    /// Bearer token
    pub api_key: String,
    /// Sample rate of the returned PCM
    pub sample_rate: u32,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8083/v1/synthesize".to_string(),
            api_key: String::new(),
            sample_rate: 24_000,
            timeout_ms: 15_000,
        }
    }
}

impl SynthesisConfig {
    /// Decimation ratio from the provider rate to the 8kHz telephony rate
    pub fn downsample_ratio(&self) -> usize {
        (self.sample_rate / 8000).max(1) as usize
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
}

/// HTTP synthesis client
pub struct SynthesisClient {
    config: SynthesisConfig,
    client: Client,
}

impl SynthesisClient {
    pub fn new(config: SynthesisConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Synthesize one sentence into linear PCM samples at the provider rate.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<i16>, ProviderError> {
        let request =
            SynthesisRequest { text, voice, sample_rate: self.config.sample_rate };

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("HTTP {}: {}", status, body)));
        }

        let bytes = response.bytes().await?;
        if bytes.len() % 2 != 0 {
            return Err(ProviderError::InvalidResponse(format!(
                "odd PCM byte length {}",
                bytes.len()
            )));
        }

        let pcm = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(pcm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_ratio() {
        let config = SynthesisConfig { sample_rate: 24_000, ..Default::default() };
        assert_eq!(config.downsample_ratio(), 3);

        let config = SynthesisConfig { sample_rate: 8_000, ..Default::default() };
        assert_eq!(config.downsample_ratio(), 1);
    }
}
