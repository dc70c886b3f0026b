//! Telephony audio processing
//!
//! Everything here runs on the hot path of every inbound 20ms frame, so the
//! whole crate is allocation-light and free of provider I/O:
//! - G.711 mu-law codec with single-pass downsample+encode
//! - Spectral-subtraction style noise suppression with one-time calibration
//! - Adaptive-threshold VAD with utterance endpointing and barge-in detection

pub mod codec;
pub mod noise;
pub mod vad;

pub use codec::{downsample_and_encode, linear_to_mulaw, mulaw_to_linear, wav_container};
pub use noise::{NoiseProfile, NoiseSuppressor, NoiseSuppressorConfig};
pub use vad::{BargeInConfig, BargeInDetector, Endpointer, EndpointerConfig, FrameVerdict};

/// Telephony sample rate in Hz
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Bytes per 20ms mu-law frame at 8kHz
pub const FRAME_BYTES: usize = 160;
