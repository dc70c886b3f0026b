//! Per-call cost accounting
//!
//! LLM and TTS usage accumulates during the call; STT and telephony are
//! billed per audio minute, so they are computed once at finalize from the
//! call duration. The charged amount is duration times the per-minute price
//! regardless of what the providers cost.

use callbridge_core::CostBreakdown;
use serde::Deserialize;

/// Provider rates and the user-facing price, all in account currency
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostRates {
    /// STT cost per audio minute
    pub stt_per_minute: f64,
    /// LLM prompt cost per 1000 tokens
    pub llm_prompt_per_1k_tokens: f64,
    /// LLM completion cost per 1000 tokens
    pub llm_completion_per_1k_tokens: f64,
    /// TTS cost per 1000 characters
    pub tts_per_1k_chars: f64,
    /// Telephony cost per call minute
    pub telephony_per_minute: f64,
    /// Price charged to the user per call minute
    pub price_per_minute: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            stt_per_minute: 0.006,
            llm_prompt_per_1k_tokens: 0.00015,
            llm_completion_per_1k_tokens: 0.0006,
            tts_per_1k_chars: 0.015,
            telephony_per_minute: 0.014,
            price_per_minute: 0.10,
        }
    }
}

/// Accumulates usage during a call and produces the final breakdown
#[derive(Debug)]
pub struct CostLedger {
    rates: CostRates,
    llm_cost: f64,
    tts_cost: f64,
}

impl CostLedger {
    pub fn new(rates: CostRates) -> Self {
        Self { rates, llm_cost: 0.0, tts_cost: 0.0 }
    }

    /// Record one LLM request's token usage
    pub fn add_llm(&mut self, prompt_tokens: usize, completion_tokens: usize) {
        self.llm_cost += prompt_tokens as f64 / 1000.0 * self.rates.llm_prompt_per_1k_tokens;
        self.llm_cost +=
            completion_tokens as f64 / 1000.0 * self.rates.llm_completion_per_1k_tokens;
    }

    /// Record one synthesized sentence's character count
    pub fn add_tts(&mut self, chars: usize) {
        self.tts_cost += chars as f64 / 1000.0 * self.rates.tts_per_1k_chars;
    }

    /// Compute the duration-dependent components and close the ledger
    pub fn finalize(&self, duration_secs: f64) -> CostBreakdown {
        let minutes = duration_secs / 60.0;
        let stt_cost = minutes * self.rates.stt_per_minute;
        let telephony_cost = minutes * self.rates.telephony_per_minute;
        let total_cost = stt_cost + self.llm_cost + self.tts_cost + telephony_cost;
        let charged = minutes * self.rates.price_per_minute;

        CostBreakdown {
            stt_cost,
            llm_cost: self.llm_cost,
            tts_cost: self.tts_cost,
            telephony_cost,
            total_cost,
            charged,
            profit: charged - total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_breakdown() {
        let mut ledger = CostLedger::new(CostRates::default());
        ledger.add_llm(1000, 1000);
        ledger.add_tts(1000);

        // Two minutes of call time
        let costs = ledger.finalize(120.0);

        assert!((costs.stt_cost - 0.012).abs() < 1e-9);
        assert!((costs.telephony_cost - 0.028).abs() < 1e-9);
        assert!((costs.llm_cost - 0.00075).abs() < 1e-9);
        assert!((costs.tts_cost - 0.015).abs() < 1e-9);
        assert!((costs.charged - 0.20).abs() < 1e-9);
        assert!(
            (costs.total_cost - (costs.stt_cost + costs.llm_cost + costs.tts_cost + costs.telephony_cost))
                .abs()
                < 1e-9
        );
        assert!((costs.profit - (costs.charged - costs.total_cost)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_charges_nothing() {
        let ledger = CostLedger::new(CostRates::default());
        let costs = ledger.finalize(0.0);
        assert_eq!(costs.charged, 0.0);
        assert_eq!(costs.stt_cost, 0.0);
    }
}
