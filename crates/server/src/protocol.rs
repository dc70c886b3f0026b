//! Media-stream wire protocol
//!
//! JSON messages exchanged over the telephony provider's media-stream
//! WebSocket. Events are tagged by the `event` field; identifiers use the
//! provider's camelCase names on the wire.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use callbridge_core::{CallMetadata, OutboundEvent};

/// Messages received from the telephony provider
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMessage {
    /// Socket-level handshake, sent once before `start`
    Connected,
    /// Stream registration with call identity and custom parameters
    Start { start: StartPayload },
    /// One frame of base64-encoded mu-law audio
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Normal end of the stream
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        stop: StopPayload,
    },
    /// Playback acknowledgement for a mark we sent
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    /// Any event type this server does not act on
    #[serde(other)]
    Unknown,
}

/// Payload of the `start` event
#[derive(Debug, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: CustomParameters,
}

/// Caller-supplied parameters forwarded by the telephony provider. All
/// optional on the wire; absent keys become empty strings.
#[derive(Debug, Default, Deserialize)]
pub struct CustomParameters {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default)]
    pub prompt_id: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub customer_name: String,
}

impl StartPayload {
    /// Flatten the start event into the call identity the pipeline carries
    pub fn into_metadata(self) -> CallMetadata {
        CallMetadata {
            call_sid: self.call_sid,
            stream_sid: self.stream_sid,
            user_id: self.custom_parameters.user_id,
            campaign_id: self.custom_parameters.campaign_id,
            prompt_id: self.custom_parameters.prompt_id,
            phone_number: self.custom_parameters.phone_number,
            customer_name: self.custom_parameters.customer_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded mu-law bytes
    pub payload: String,
}

impl MediaPayload {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.payload)
    }
}

#[derive(Debug, Deserialize)]
pub struct StopPayload {
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

/// Messages sent back to the telephony provider
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl OutboundMessage {
    /// Serialize a pipeline event into its wire form for one stream
    pub fn from_event(stream_sid: &str, event: OutboundEvent) -> Self {
        match event {
            OutboundEvent::Media(bytes) => OutboundMessage::Media {
                stream_sid: stream_sid.to_string(),
                media: OutboundMedia { payload: BASE64.encode(bytes) },
            },
            OutboundEvent::Mark(name) => OutboundMessage::Mark {
                stream_sid: stream_sid.to_string(),
                mark: OutboundMark { name },
            },
            OutboundEvent::Clear => {
                OutboundMessage::Clear { stream_sid: stream_sid.to_string() }
            }
        }
    }
}
