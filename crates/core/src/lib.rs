//! Core types shared across the call bridge
//!
//! This crate provides foundational types used across all other crates:
//! - Call identity, status, and persisted call records
//! - Conversation turns and transcripts
//! - Prompt/voice configuration
//! - Outbound media events

pub mod call;
pub mod conversation;
pub mod media;

pub use call::{CallMetadata, CallRecord, CallStatus, CostBreakdown, PromptConfig};
pub use conversation::{TranscriptEntry, Turn, TurnRole};
pub use media::OutboundEvent;
