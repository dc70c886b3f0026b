//! Outbound media events
//!
//! The pipeline never touches the socket directly; it emits these events on
//! the session's outbound channel and the transport task serializes them
//! into protocol frames.

/// Event sent from the pipeline to the media transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// One telephony-sized frame of companded audio (base64-encoded by the
    /// transport before sending)
    Media(Vec<u8>),
    /// Completion marker sent after each synthesized utterance
    Mark(String),
    /// Flush any audio the provider has buffered but not yet played.
    /// Sent on barge-in so the interruption is audible immediately.
    Clear,
}
