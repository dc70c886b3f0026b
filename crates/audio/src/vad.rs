//! Voice activity detection, utterance endpointing, and barge-in
//!
//! Classification is threshold-based, not model-based: each frame yields an
//! energy ratio (fraction of samples above a silence epsilon) and a mean
//! amplitude. A sliding window of recent energy ratios drives an adaptive
//! threshold taken from a low percentile of the window, so the detector
//! tracks ambient noise level instead of using a static cutoff.
//!
//! The endpointer accumulates speech frames into an utterance buffer and
//! arms a debounce deadline after a few consecutive silent frames; the
//! per-call task awaits that deadline and collects the utterance exactly
//! once per pause. Barge-in uses a stricter amplitude floor sustained over
//! several frames so echo and noise cannot cut off playback.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::codec::mulaw_to_linear;

/// Per-frame signal measurements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFeatures {
    /// Fraction of samples above the silence epsilon
    pub energy_ratio: f32,
    /// Mean normalized distance from silence
    pub mean_amplitude: f32,
}

/// Speech/silence verdict for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    Silence,
    Speech,
}

/// Endpointer tuning. Empirical defaults, all overridable from settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointerConfig {
    /// Sliding window length for the adaptive threshold
    pub window_size: usize,
    /// Percentile of the window used as the ambient level (0.0 - 1.0)
    pub threshold_percentile: f32,
    /// Margin added on top of the ambient level
    pub threshold_margin: f32,
    /// A frame is speech when its energy ratio exceeds this fraction of the
    /// adaptive threshold
    pub speech_ratio_factor: f32,
    /// Minimum mean amplitude for a speech verdict
    pub variance_floor: f32,
    /// Normalized amplitude below which a sample counts as silence
    pub silence_epsilon: f32,
    /// Consecutive silent frames before the debounce deadline is armed
    pub silence_frames_to_arm: u32,
    /// Trailing-silence debounce before the utterance is considered complete
    pub debounce_ms: u64,
}

impl Default for EndpointerConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            threshold_percentile: 0.30,
            threshold_margin: 0.08,
            speech_ratio_factor: 0.9,
            variance_floor: 0.015,
            silence_epsilon: 0.02,
            silence_frames_to_arm: 3,
            debounce_ms: 700,
        }
    }
}

impl EndpointerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Compute per-frame features from raw mu-law bytes.
pub fn frame_features(frame: &[u8], silence_epsilon: f32) -> FrameFeatures {
    if frame.is_empty() {
        return FrameFeatures { energy_ratio: 0.0, mean_amplitude: 0.0 };
    }
    let mut active = 0usize;
    let mut amplitude_sum = 0.0f32;
    for &byte in frame {
        let amp = mulaw_to_linear(byte).unsigned_abs() as f32 / 32768.0;
        amplitude_sum += amp;
        if amp > silence_epsilon {
            active += 1;
        }
    }
    FrameFeatures {
        energy_ratio: active as f32 / frame.len() as f32,
        mean_amplitude: amplitude_sum / frame.len() as f32,
    }
}

/// Per-call utterance endpointer. Owned by the call task; no locking.
#[derive(Debug)]
pub struct Endpointer {
    config: EndpointerConfig,
    energy_window: VecDeque<f32>,
    utterance: Vec<u8>,
    utterance_started_at: Option<Instant>,
    consecutive_silence: u32,
    debounce_deadline: Option<Instant>,
}

impl Endpointer {
    pub fn new(config: EndpointerConfig) -> Self {
        let window = VecDeque::with_capacity(config.window_size);
        Self {
            config,
            energy_window: window,
            utterance: Vec::new(),
            utterance_started_at: None,
            consecutive_silence: 0,
            debounce_deadline: None,
        }
    }

    /// Adaptive threshold derived from a low percentile of recent energy
    /// ratios plus a fixed margin.
    fn adaptive_threshold(&self) -> f32 {
        if self.energy_window.is_empty() {
            return self.config.threshold_margin;
        }
        let mut sorted: Vec<f32> = self.energy_window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() as f32 * self.config.threshold_percentile) as usize)
            .min(sorted.len() - 1);
        sorted[idx] + self.config.threshold_margin
    }

    /// Classify a frame and feed its energy into the sliding window. Does
    /// not touch the utterance buffer; `process` builds on this.
    pub fn classify(&mut self, frame: &[u8]) -> (FrameVerdict, FrameFeatures) {
        let features = frame_features(frame, self.config.silence_epsilon);
        let threshold = self.adaptive_threshold();

        if self.energy_window.len() >= self.config.window_size {
            self.energy_window.pop_front();
        }
        self.energy_window.push_back(features.energy_ratio);

        let is_speech = features.energy_ratio > self.config.speech_ratio_factor * threshold
            && features.mean_amplitude > self.config.variance_floor;
        let verdict = if is_speech { FrameVerdict::Speech } else { FrameVerdict::Silence };
        (verdict, features)
    }

    /// Run the full endpointing state machine for one inbound frame.
    pub fn process(&mut self, frame: &[u8], now: Instant) -> FrameVerdict {
        let (verdict, _) = self.classify(frame);
        match verdict {
            FrameVerdict::Speech => {
                if self.utterance_started_at.is_none() {
                    self.utterance_started_at = Some(now);
                    tracing::trace!("utterance started");
                }
                self.utterance.extend_from_slice(frame);
                self.consecutive_silence = 0;
                self.debounce_deadline = None;
            },
            FrameVerdict::Silence => {
                if self.utterance_started_at.is_some() {
                    self.consecutive_silence += 1;
                    if self.consecutive_silence >= self.config.silence_frames_to_arm
                        && self.debounce_deadline.is_none()
                    {
                        self.debounce_deadline = Some(now + self.config.debounce());
                    }
                }
            },
        }
        verdict
    }

    /// Armed debounce deadline, if any. The call task awaits this.
    pub fn deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    /// Collect the completed utterance and return to idle. Returns `None`
    /// when no speech was accumulated.
    pub fn fire(&mut self) -> Option<Vec<u8>> {
        self.debounce_deadline = None;
        self.consecutive_silence = 0;
        self.utterance_started_at = None;
        if self.utterance.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.utterance))
    }

    /// Drop any partial utterance (used when an interruption supersedes it).
    /// The energy window is kept so the ambient estimate survives.
    pub fn discard_utterance(&mut self) {
        self.utterance.clear();
        self.utterance_started_at = None;
        self.consecutive_silence = 0;
        self.debounce_deadline = None;
    }

    /// Whether an utterance is currently being accumulated.
    pub fn accumulating(&self) -> bool {
        self.utterance_started_at.is_some()
    }
}

/// Barge-in tuning. The amplitude floor is intentionally stricter than the
/// endpointer's so echo and line noise cannot stop playback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BargeInConfig {
    /// Minimum mean amplitude for a frame to count toward an interruption
    pub variance_floor: f32,
    /// Speech frames that must persist beyond this count to trigger
    pub consecutive_frames: u32,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self { variance_floor: 0.05, consecutive_frames: 5 }
    }
}

/// Detects genuine interruptions while the agent is speaking.
#[derive(Debug)]
pub struct BargeInDetector {
    config: BargeInConfig,
    streak: u32,
}

impl BargeInDetector {
    pub fn new(config: BargeInConfig) -> Self {
        Self { config, streak: 0 }
    }

    /// Feed one playback-time frame observation. Returns true when a
    /// sustained strong-speech run crosses the configured length.
    pub fn observe(&mut self, verdict: FrameVerdict, features: FrameFeatures) -> bool {
        let strong = verdict == FrameVerdict::Speech
            && features.mean_amplitude > self.config.variance_floor;
        if !strong {
            self.streak = 0;
            return false;
        }
        self.streak += 1;
        if self.streak > self.config.consecutive_frames {
            self.streak = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::linear_to_mulaw;
    use crate::FRAME_BYTES;

    fn frame_of(amplitude: i16) -> Vec<u8> {
        vec![linear_to_mulaw(amplitude); FRAME_BYTES]
    }

    fn speech_frame() -> Vec<u8> {
        frame_of(18000)
    }

    fn silence_frame() -> Vec<u8> {
        frame_of(0)
    }

    #[test]
    fn test_all_silence_never_classified_as_speech() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        let now = Instant::now();
        for _ in 0..200 {
            assert_eq!(ep.process(&silence_frame(), now), FrameVerdict::Silence);
        }
        assert!(ep.deadline().is_none());
        assert!(ep.fire().is_none());
    }

    #[test]
    fn test_endpointer_fires_once_per_pause() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        let now = Instant::now();

        let spoken: Vec<Vec<u8>> = (0..10).map(|i| frame_of(15000 + i * 500)).collect();
        for frame in &spoken {
            assert_eq!(ep.process(frame, now), FrameVerdict::Speech);
        }
        assert!(ep.deadline().is_none());

        // Deadline arms after the configured run of silent frames and is
        // not re-armed by further silence
        for _ in 0..2 {
            ep.process(&silence_frame(), now);
        }
        assert!(ep.deadline().is_none());
        ep.process(&silence_frame(), now);
        let deadline = ep.deadline().unwrap();
        for _ in 0..20 {
            ep.process(&silence_frame(), now);
        }
        assert_eq!(ep.deadline(), Some(deadline));

        // The collected utterance is exactly the speech frames in order
        let utterance = ep.fire().unwrap();
        let expected: Vec<u8> = spoken.iter().flatten().copied().collect();
        assert_eq!(utterance, expected);

        // Idle again: no second fire, trailing silence does not re-arm
        assert!(ep.fire().is_none());
        for _ in 0..10 {
            ep.process(&silence_frame(), now);
        }
        assert!(ep.deadline().is_none());
    }

    #[test]
    fn test_speech_resume_disarms_deadline() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        let now = Instant::now();
        for _ in 0..5 {
            ep.process(&speech_frame(), now);
        }
        for _ in 0..3 {
            ep.process(&silence_frame(), now);
        }
        assert!(ep.deadline().is_some());
        ep.process(&speech_frame(), now);
        assert!(ep.deadline().is_none());
        assert!(ep.accumulating());
    }

    #[test]
    fn test_discard_utterance_clears_state() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        let now = Instant::now();
        for _ in 0..5 {
            ep.process(&speech_frame(), now);
        }
        ep.discard_utterance();
        assert!(!ep.accumulating());
        assert!(ep.fire().is_none());
    }

    #[test]
    fn test_barge_in_requires_sustained_strong_speech() {
        let config = BargeInConfig { variance_floor: 0.05, consecutive_frames: 5 };
        let mut detector = BargeInDetector::new(config);
        let strong = FrameFeatures { energy_ratio: 1.0, mean_amplitude: 0.4 };

        // Five strong frames are not enough; the sixth triggers
        for _ in 0..5 {
            assert!(!detector.observe(FrameVerdict::Speech, strong));
        }
        assert!(detector.observe(FrameVerdict::Speech, strong));
    }

    #[test]
    fn test_barge_in_ignores_blips_and_weak_speech() {
        let config = BargeInConfig { variance_floor: 0.05, consecutive_frames: 5 };
        let mut detector = BargeInDetector::new(config);
        let strong = FrameFeatures { energy_ratio: 1.0, mean_amplitude: 0.4 };
        let weak = FrameFeatures { energy_ratio: 0.6, mean_amplitude: 0.02 };

        // Interrupted streaks never accumulate
        for _ in 0..4 {
            assert!(!detector.observe(FrameVerdict::Speech, strong));
        }
        assert!(!detector.observe(FrameVerdict::Silence, weak));
        for _ in 0..4 {
            assert!(!detector.observe(FrameVerdict::Speech, strong));
        }

        // Weak speech below the stricter floor never counts
        detector.reset();
        for _ in 0..20 {
            assert!(!detector.observe(FrameVerdict::Speech, weak));
        }
    }
}
