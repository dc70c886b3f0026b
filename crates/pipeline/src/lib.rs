//! Per-call voice pipeline
//!
//! Each call runs as a pair of tasks with disjoint state:
//! - the ingress task owns the endpointer, noise suppressor, and barge-in
//!   detector, and turns raw media frames into complete utterances
//! - the dialogue task owns the conversation history, transcript, and cost
//!   ledger, and drives transcribe -> respond -> speak for each utterance,
//!   then finalizes the call record
//!
//! The two communicate over an mpsc channel plus a small set of atomic
//! playback flags, so barge-in can cut a response short while the dialogue
//! task is deep inside a provider await.

pub mod costs;
pub mod dialogue;
pub mod ingress;
pub mod orchestrator;
pub mod playback;
pub mod segment;

pub use costs::{CostLedger, CostRates};
pub use orchestrator::{
    spawn_call, CallHandle, IngressEvent, NoiseConfig, PipelineConfig, PipelineContext,
};
pub use playback::{PlaybackConfig, PlaybackFlags};
pub use segment::SentenceSegmenter;
