//! Call identity, configuration, and persisted results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::TranscriptEntry;

/// Identity and foreign keys for one call, extracted from the media stream
/// start event. The user/campaign/prompt references are opaque keys resolved
/// against external stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallMetadata {
    /// Telephony provider call identifier
    pub call_sid: String,
    /// Media stream identifier (key for registry lookups during the call)
    pub stream_sid: String,
    /// Owning user account
    pub user_id: String,
    /// Campaign the call belongs to
    pub campaign_id: String,
    /// Prompt/voice configuration reference
    pub prompt_id: String,
    /// Dialed number
    pub phone_number: String,
    /// Display name of the callee
    pub customer_name: String,
}

/// Final status of a completed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Normal stop event, billing deducted
    Completed,
    /// Call completed but the credit deduction failed; reconciled out of band
    BillingPending,
    /// Session ended without a stop event (socket drop or staleness eviction)
    Aborted,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Completed => "completed",
            CallStatus::BillingPending => "billing_pending",
            CallStatus::Aborted => "aborted",
        }
    }
}

/// Per-provider cost snapshot written once at call end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub stt_cost: f64,
    pub llm_cost: f64,
    pub tts_cost: f64,
    pub telephony_cost: f64,
    /// Sum of the four provider components
    pub total_cost: f64,
    /// Amount charged to the user (duration x price per minute)
    pub charged: f64,
    /// Charged minus total cost
    pub profit: f64,
}

/// The record persisted for every call, normal or aborted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub metadata: CallMetadata,
    pub status: CallStatus,
    /// Call duration in seconds
    pub duration_secs: f64,
    pub transcript: Vec<TranscriptEntry>,
    /// LLM-generated summary, empty when the summary request failed
    pub summary: String,
    pub costs: CostBreakdown,
    /// Identifier of the pipeline instance that served the call
    pub pipeline_id: String,
    pub ended_at: DateTime<Utc>,
}

/// Prompt and voice configuration resolved at call start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System prompt seeding the conversation history
    pub system_prompt: String,
    /// First utterance spoken by the agent
    pub greeting: String,
    /// TTS voice identifier
    pub voice_id: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a polite, concise phone assistant. Keep answers \
                            short and conversational."
                .to_string(),
            greeting: "Hello! How can I help you today?".to_string(),
            voice_id: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(CallStatus::BillingPending.as_str(), "billing_pending");
    }

    #[test]
    fn test_prompt_config_defaults() {
        let cfg = PromptConfig::default();
        assert!(!cfg.system_prompt.is_empty());
        assert!(!cfg.greeting.is_empty());
    }
}
