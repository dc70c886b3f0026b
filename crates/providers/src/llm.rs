//! Chat (LLM) client
//!
//! Issues chat-completion requests against an OpenAI-compatible endpoint.
//! The streaming path decodes newline-delimited `data: {...}` frames and
//! forwards token deltas over an mpsc channel as they arrive; a cooperative
//! cancel flag is polled at every chunk boundary so a barge-in stops the
//! stream read within one network chunk. The non-streaming path serves the
//! end-of-call summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use callbridge_core::{Turn, TurnRole};

use crate::ProviderError;

/// Chat provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat-completions endpoint
    pub url: String,
    /// Bearer token
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Temperature (0.0 - 1.0)
    pub temperature: f32,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8082/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            timeout_ms: 60_000,
        }
    }
}

/// Result of one chat request
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Full generated text (partial when interrupted)
    pub text: String,
    /// Prompt token count (provider-reported or estimated)
    pub prompt_tokens: usize,
    /// Completion token count (provider-reported or estimated)
    pub completion_tokens: usize,
    /// Whether the stream read was abandoned on a cancel request
    pub interrupted: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f32 * 1.3) as usize
}

fn estimate_prompt_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(Turn::estimated_tokens).sum()
}

/// HTTP chat client
pub struct ChatClient {
    config: ChatConfig,
    client: Client,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn convert_turns<'a>(&self, turns: &'a [Turn]) -> Vec<ChatMessage<'a>> {
        turns
            .iter()
            .map(|t| ChatMessage {
                role: match t.role {
                    TurnRole::System => "system",
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                content: &t.content,
            })
            .collect()
    }

    async fn send(&self, turns: &[Turn], stream: bool) -> Result<reqwest::Response, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: self.convert_turns(turns),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        };

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
        Ok(response)
    }

    /// Stream a chat completion, forwarding each token delta on `tx`.
    ///
    /// `cancel` is checked at every chunk boundary; once set, the remaining
    /// stream is abandoned and the outcome carries the partial text with
    /// `interrupted = true`.
    pub async fn stream_chat(
        &self,
        turns: &[Turn],
        tx: mpsc::Sender<String>,
        cancel: &AtomicBool,
    ) -> Result<ChatOutcome, ProviderError> {
        let response = self.send(turns, true).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();
        let mut usage: Option<Usage> = None;
        let mut interrupted = false;

        'read: while let Some(chunk) = stream.next().await {
            if cancel.load(Ordering::Relaxed) {
                interrupted = true;
                break 'read;
            }
            let chunk = chunk.map_err(|e| ProviderError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                if let Some(json_str) = line.strip_prefix("data: ") {
                    if json_str == "[DONE]" {
                        break 'read;
                    }

                    if let Ok(event) = serde_json::from_str::<StreamChunk>(json_str) {
                        if let Some(u) = event.usage {
                            usage = Some(u);
                        }
                        for choice in event.choices {
                            if let Some(text) = choice.delta.content {
                                full_text.push_str(&text);
                                let _ = tx.send(text).await;
                            }
                        }
                    }
                }
            }
        }

        let (prompt_tokens, completion_tokens) = match usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => (estimate_prompt_tokens(turns), estimate_tokens(&full_text)),
        };

        Ok(ChatOutcome { text: full_text, prompt_tokens, completion_tokens, interrupted })
    }

    /// Non-streaming completion, used for the end-of-call summary.
    pub async fn complete(&self, turns: &[Turn]) -> Result<ChatOutcome, ProviderError> {
        let response = self.send(turns, false).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let (prompt_tokens, completion_tokens) = match parsed.usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => (estimate_prompt_tokens(turns), estimate_tokens(&text)),
        };

        Ok(ChatOutcome { text, prompt_tokens, completion_tokens, interrupted: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_chunk_parsing() {
        let json = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_stream_chunk_tolerates_empty_delta() {
        let json = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn test_token_estimation() {
        let turns =
            vec![Turn::system("You are a helpful assistant"), Turn::user("Hello there friend")];
        // 5 words * 1.3 + 3 words * 1.3, truncated per turn
        assert_eq!(estimate_prompt_tokens(&turns), 9);
        assert_eq!(estimate_tokens("one two three four"), 5);
    }
}
