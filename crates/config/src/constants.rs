//! Centralized tuning constants
//!
//! Single source of truth for the numeric defaults that appear in settings
//! and in the operational documentation. The audio and pipeline config
//! structs carry the same values in their `Default` impls; this catalogue
//! is what the default settings file and the validators reference.

/// Telephony media format
pub mod telephony {
    /// Narrowband sample rate (Hz)
    pub const SAMPLE_RATE: u32 = 8000;

    /// Frame duration (ms)
    pub const FRAME_MS: u32 = 20;

    /// Bytes per mu-law frame (20ms at 8kHz, one byte per sample)
    pub const FRAME_BYTES: usize = 160;
}

/// Endpointing defaults
pub mod endpointing {
    /// Sliding window of per-frame energy ratios
    pub const WINDOW_FRAMES: usize = 50;

    /// Percentile of the window used as the adaptive noise floor
    pub const THRESHOLD_PERCENTILE: f32 = 0.30;

    /// Margin added on top of the adaptive floor
    pub const THRESHOLD_MARGIN: f32 = 0.08;

    /// Speech requires ratio above this multiple of the adaptive threshold
    pub const SPEECH_RATIO_FACTOR: f32 = 0.9;

    /// Minimum frame variance for a speech verdict
    pub const VARIANCE_FLOOR: f32 = 0.015;

    /// Companded distance from the silence center below which a sample is quiet
    pub const SILENCE_EPSILON: f32 = 0.02;

    /// Consecutive silent frames that arm the debounce deadline
    pub const ARM_AFTER_SILENT_FRAMES: u32 = 3;

    /// Pause length that ends an utterance (ms)
    pub const DEBOUNCE_MS: u64 = 700;
}

/// Noise suppression defaults
pub mod noise {
    /// Frames averaged into the noise profile before suppression starts
    pub const CALIBRATION_FRAMES: u32 = 50;

    /// A sample further than this multiple of the profile level is speech
    pub const THRESHOLD_MULTIPLE: f32 = 2.0;

    /// Fraction of the excess above the profile removed from noise samples
    pub const REDUCTION_FACTOR: f32 = 0.6;
}

/// Barge-in detection defaults
pub mod barge_in {
    /// Stricter variance floor applied while the agent is speaking
    pub const VARIANCE_FLOOR: f32 = 0.05;

    /// Speech frames beyond this streak interrupt playback
    pub const CONSECUTIVE_FRAMES: u32 = 5;
}

/// Session registry defaults
pub mod registry {
    /// Hard upper bound on concurrent calls
    pub const MAX_SESSIONS: usize = 100;

    /// Interval between staleness sweeps (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 60;

    /// Sessions older than this are evicted regardless of activity (seconds)
    pub const STALE_AFTER_SECS: u64 = 3600;
}

/// Provider endpoints (defaults for local development)
pub mod endpoints {
    /// Transcription service
    pub const STT_DEFAULT: &str = "http://localhost:8081/v1/transcribe";

    /// Chat completions service
    pub const LLM_DEFAULT: &str = "http://localhost:8082/v1/chat/completions";

    /// Speech synthesis service
    pub const TTS_DEFAULT: &str = "http://localhost:8083/v1/synthesize";

    /// Billing deduction endpoint
    pub const BILLING_DEFAULT: &str = "http://localhost:8084/v1/deduct";
}

/// Request timeouts (milliseconds)
pub mod timeouts {
    /// STT request timeout
    pub const STT_MS: u64 = 10_000;

    /// LLM request timeout (covers the whole stream)
    pub const LLM_MS: u64 = 60_000;

    /// TTS synthesis timeout
    pub const TTS_MS: u64 = 15_000;

    /// Billing RPC timeout
    pub const BILLING_MS: u64 = 5_000;
}

/// Provider and customer rates (USD)
pub mod rates {
    /// STT cost per minute of audio
    pub const STT_PER_MINUTE: f64 = 0.006;

    /// LLM prompt cost per 1k tokens
    pub const LLM_PROMPT_PER_1K_TOKENS: f64 = 0.00015;

    /// LLM completion cost per 1k tokens
    pub const LLM_COMPLETION_PER_1K_TOKENS: f64 = 0.0006;

    /// TTS cost per 1k characters
    pub const TTS_PER_1K_CHARS: f64 = 0.015;

    /// Telephony cost per minute
    pub const TELEPHONY_PER_MINUTE: f64 = 0.014;

    /// Price charged to the customer per minute
    pub const PRICE_PER_MINUTE: f64 = 0.10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_arithmetic() {
        let samples_per_frame = telephony::SAMPLE_RATE * telephony::FRAME_MS / 1000;
        assert_eq!(samples_per_frame as usize, telephony::FRAME_BYTES);
    }

    #[test]
    fn test_endpointing_ranges() {
        assert!(endpointing::THRESHOLD_PERCENTILE > 0.0 && endpointing::THRESHOLD_PERCENTILE < 1.0);
        assert!(endpointing::SPEECH_RATIO_FACTOR > 0.0);
        assert!(barge_in::VARIANCE_FLOOR > endpointing::VARIANCE_FLOOR);
    }

    #[test]
    fn test_price_covers_provider_costs() {
        let per_minute_floor = rates::STT_PER_MINUTE + rates::TELEPHONY_PER_MINUTE;
        assert!(rates::PRICE_PER_MINUTE > per_minute_floor);
    }
}
