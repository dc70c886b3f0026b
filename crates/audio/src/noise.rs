//! Background-noise suppression
//!
//! Spectral-subtraction in spirit: the first N frames of a call (sampled
//! only while the agent is not speaking) are averaged into a per-index
//! noise profile. Calibration happens exactly once per call and is never
//! re-triggered. Once calibrated, samples that stand clear of the profile
//! are kept verbatim and the rest are pulled toward the profile level.

use serde::Deserialize;

use crate::codec::{linear_to_mulaw, mulaw_to_linear};
use crate::FRAME_BYTES;

/// Tuning knobs for the suppressor. Empirical defaults, all overridable
/// from settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoiseSuppressorConfig {
    /// Frames averaged into the profile before suppression starts
    pub calibration_frames: u32,
    /// A sample further than this multiple of the profile level is speech
    pub threshold_multiple: f32,
    /// Fraction of the excess above the profile removed from noise samples
    pub reduction_factor: f32,
}

impl Default for NoiseSuppressorConfig {
    fn default() -> Self {
        Self {
            calibration_frames: 50,
            threshold_multiple: 2.0,
            reduction_factor: 0.6,
        }
    }
}

/// Averaged per-index noise magnitude, normalized to [0, 1]
#[derive(Debug, Clone)]
pub struct NoiseProfile {
    magnitudes: Vec<f32>,
    frames_sampled: u32,
    calibrated: bool,
}

impl NoiseProfile {
    fn new() -> Self {
        Self {
            magnitudes: vec![0.0; FRAME_BYTES],
            frames_sampled: 0,
            calibrated: false,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn frames_sampled(&self) -> u32 {
        self.frames_sampled
    }
}

fn amplitude(byte: u8) -> f32 {
    mulaw_to_linear(byte).unsigned_abs() as f32 / 32768.0
}

/// Per-call noise suppressor. Pure transform over (frame, profile state);
/// no provider I/O, cheap enough for every inbound frame.
#[derive(Debug)]
pub struct NoiseSuppressor {
    config: NoiseSuppressorConfig,
    profile: NoiseProfile,
}

impl NoiseSuppressor {
    pub fn new(config: NoiseSuppressorConfig) -> Self {
        Self { config, profile: NoiseProfile::new() }
    }

    pub fn profile(&self) -> &NoiseProfile {
        &self.profile
    }

    /// Process one inbound frame in place. Calibration frames and frames
    /// arriving mid-playback pass through unmodified.
    pub fn apply(&mut self, frame: &mut [u8], agent_speaking: bool) {
        if !self.profile.calibrated {
            if !agent_speaking {
                self.accumulate(frame);
            }
            return;
        }
        self.suppress(frame);
    }

    fn accumulate(&mut self, frame: &[u8]) {
        let n = frame.len().min(self.profile.magnitudes.len());
        for (slot, &byte) in self.profile.magnitudes[..n].iter_mut().zip(frame) {
            *slot += amplitude(byte);
        }
        self.profile.frames_sampled += 1;
        if self.profile.frames_sampled >= self.config.calibration_frames {
            let count = self.profile.frames_sampled as f32;
            for slot in &mut self.profile.magnitudes {
                *slot /= count;
            }
            self.profile.calibrated = true;
            tracing::debug!(frames = self.profile.frames_sampled, "noise profile calibrated");
        }
    }

    fn suppress(&self, frame: &mut [u8]) {
        for (i, byte) in frame.iter_mut().enumerate() {
            let floor = match self.profile.magnitudes.get(i) {
                Some(&m) => m,
                None => break,
            };
            let sample = mulaw_to_linear(*byte);
            let amp = sample.unsigned_abs() as f32 / 32768.0;
            if amp > self.config.threshold_multiple * floor {
                continue;
            }
            if amp <= floor {
                continue;
            }
            let reduced = amp - (amp - floor) * self.config.reduction_factor;
            let magnitude = (reduced * 32768.0) as i32;
            let attenuated = if sample < 0 {
                -magnitude.min(32767)
            } else {
                magnitude.min(32767)
            };
            *byte = linear_to_mulaw(attenuated as i16);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_frame() -> Vec<u8> {
        vec![0xFF; FRAME_BYTES]
    }

    #[test]
    fn test_calibration_completes_after_exact_frame_count() {
        let mut sup = NoiseSuppressor::new(NoiseSuppressorConfig {
            calibration_frames: 50,
            ..Default::default()
        });
        for i in 0..50 {
            assert!(!sup.profile().is_calibrated(), "calibrated early at frame {i}");
            let mut frame = silent_frame();
            sup.apply(&mut frame, false);
        }
        assert!(sup.profile().is_calibrated());
        assert_eq!(sup.profile().frames_sampled(), 50);
    }

    #[test]
    fn test_calibration_frames_pass_through_unmodified() {
        let mut sup = NoiseSuppressor::new(NoiseSuppressorConfig::default());
        let mut frame: Vec<u8> = (0..FRAME_BYTES).map(|i| (i % 256) as u8).collect();
        let original = frame.clone();
        sup.apply(&mut frame, false);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_playback_frames_do_not_advance_calibration() {
        let mut sup = NoiseSuppressor::new(NoiseSuppressorConfig::default());
        let mut frame = silent_frame();
        sup.apply(&mut frame, true);
        assert_eq!(sup.profile().frames_sampled(), 0);
    }

    #[test]
    fn test_loud_samples_kept_quiet_samples_attenuated() {
        let mut sup = NoiseSuppressor::new(NoiseSuppressorConfig {
            calibration_frames: 2,
            threshold_multiple: 2.0,
            reduction_factor: 0.6,
        });
        // Calibrate on a uniform low-level hum
        let hum = linear_to_mulaw(800);
        for _ in 0..2 {
            let mut frame = vec![hum; FRAME_BYTES];
            sup.apply(&mut frame, false);
        }
        assert!(sup.profile().is_calibrated());

        // A sample near the floor (under 2x) gets pulled down; a clearly
        // louder one is kept verbatim
        let loud = linear_to_mulaw(20000);
        let near_floor = linear_to_mulaw(1200);
        let mut frame = vec![near_floor; FRAME_BYTES];
        frame[0] = loud;
        sup.apply(&mut frame, false);

        assert_eq!(frame[0], loud);
        let after = mulaw_to_linear(frame[1]).unsigned_abs();
        let before = mulaw_to_linear(near_floor).unsigned_abs();
        assert!(after < before, "expected {after} < {before}");
    }
}
