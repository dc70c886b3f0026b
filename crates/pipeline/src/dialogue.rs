//! Dialogue task
//!
//! Owns the conversation history, transcript, and cost ledger for one call.
//! Each completed utterance is transcribed, answered by the streaming LLM
//! sentence by sentence through synthesis, and appended to the history.
//! When the stream ends the task finalizes: summary, cost breakdown,
//! billing deduction, and the persisted call record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use callbridge_audio::codec::downsample_and_encode;
use callbridge_audio::FRAME_BYTES;
use callbridge_core::{
    CallMetadata, CallRecord, CallStatus, OutboundEvent, PromptConfig, TranscriptEntry, Turn,
    TurnRole,
};
use callbridge_providers::TranscriptOutcome;

use crate::costs::CostLedger;
use crate::orchestrator::{DialogueEvent, PipelineContext};
use crate::playback::{send_frames, PlaybackFlags};
use crate::segment::{sanitize_for_speech, SentenceSegmenter};

/// How the call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    /// Stop event received from the transport
    Stopped,
    /// Media channel closed without a stop event
    Aborted,
}

pub(crate) struct Dialogue {
    ctx: Arc<PipelineContext>,
    metadata: CallMetadata,
    prompt: PromptConfig,
    flags: Arc<PlaybackFlags>,
    outbound: mpsc::Sender<OutboundEvent>,
    history: Vec<Turn>,
    transcript: Vec<TranscriptEntry>,
    costs: CostLedger,
    pipeline_id: String,
    started_at: Instant,
}

impl Dialogue {
    pub(crate) fn new(
        ctx: Arc<PipelineContext>,
        metadata: CallMetadata,
        prompt: PromptConfig,
        flags: Arc<PlaybackFlags>,
        outbound: mpsc::Sender<OutboundEvent>,
        pipeline_id: String,
    ) -> Self {
        let costs = CostLedger::new(ctx.config.rates.clone());
        Self {
            ctx,
            metadata,
            prompt,
            flags,
            outbound,
            history: Vec::new(),
            transcript: Vec::new(),
            costs,
            pipeline_id,
            started_at: Instant::now(),
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<DialogueEvent>) {
        self.history.push(Turn::system(&self.prompt.system_prompt));

        // The greeting plays immediately; no settle wait since the caller
        // has nothing queued behind it
        let greeting = self.prompt.greeting.clone();
        if !greeting.is_empty() && self.speak(&greeting, false).await {
            self.record_assistant(&greeting);
        }

        let reason = loop {
            match rx.recv().await {
                Some(DialogueEvent::Utterance(audio)) => self.handle_utterance(audio).await,
                Some(DialogueEvent::Stop) => break EndReason::Stopped,
                None => break EndReason::Aborted,
            }
        };

        self.finalize(reason).await;
    }

    async fn handle_utterance(&mut self, audio: Vec<u8>) {
        self.flags.clear_interrupt();

        match self.ctx.stt.transcribe(&audio).await {
            Ok(TranscriptOutcome::Text(text)) => {
                tracing::info!(call_sid = %self.metadata.call_sid, chars = text.len(), "User utterance transcribed");
                self.history.push(Turn::user(&text));
                self.transcript.push(TranscriptEntry::new(TurnRole::User, &text));
                self.respond().await;
            },
            Ok(outcome) => {
                tracing::debug!(call_sid = %self.metadata.call_sid, ?outcome, "Utterance dropped");
            },
            Err(e) => {
                tracing::warn!(call_sid = %self.metadata.call_sid, error = %e, "Transcription failed");
                metrics::counter!("callbridge_provider_errors_total", "provider" => "stt")
                    .increment(1);
            },
        }
    }

    /// Stream an LLM response, speaking each completed sentence as soon as
    /// it is available.
    async fn respond(&mut self) {
        let (tx, mut rx) = mpsc::channel::<String>(32);
        let ctx = self.ctx.clone();
        let flags = self.flags.clone();
        let turns = self.history.clone();
        let request =
            tokio::spawn(async move { ctx.chat.stream_chat(&turns, tx, flags.cancel_flag()).await });

        let mut segmenter = SentenceSegmenter::new();
        let mut spoken = String::new();
        while let Some(delta) = rx.recv().await {
            for sentence in segmenter.push(&delta) {
                // Keep draining after a cancel so the reader never blocks
                // on a full channel
                if self.flags.response_cancelled() {
                    continue;
                }
                self.speak_sentence(&sentence, &mut spoken).await;
            }
        }

        let outcome = match request.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(call_sid = %self.metadata.call_sid, error = %e, "Chat request failed");
                metrics::counter!("callbridge_provider_errors_total", "provider" => "llm")
                    .increment(1);
                if !spoken.is_empty() {
                    self.record_assistant(&spoken);
                }
                return;
            },
            Err(e) => {
                tracing::error!(call_sid = %self.metadata.call_sid, error = %e, "Chat task failed");
                return;
            },
        };

        self.costs.add_llm(outcome.prompt_tokens, outcome.completion_tokens);

        if outcome.interrupted || self.flags.response_cancelled() {
            // History carries what was actually said aloud, not what the
            // model would have gone on to say
            if !spoken.is_empty() {
                let recorded = format!("{} [interrupted]", spoken.trim());
                self.record_assistant(&recorded);
            }
            return;
        }

        if let Some(tail) = segmenter.flush() {
            self.speak_sentence(&tail, &mut spoken).await;
        }

        let text = outcome.text.trim();
        if !text.is_empty() {
            self.record_assistant(text);
        }
    }

    async fn speak_sentence(&mut self, sentence: &str, spoken: &mut String) {
        let sanitized = sanitize_for_speech(sentence);
        if sanitized.is_empty() {
            return;
        }
        if self.speak(&sanitized, true).await {
            if !spoken.is_empty() {
                spoken.push(' ');
            }
            spoken.push_str(&sanitized);
        }
    }

    /// Synthesize and play one piece of text. Returns true when every frame
    /// was delivered without an interruption.
    async fn speak(&mut self, text: &str, settle: bool) -> bool {
        if self.flags.stop_requested() {
            return false;
        }
        self.flags.set_speaking(true);

        let pcm = match self.ctx.tts.synthesize(text, &self.prompt.voice_id).await {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(call_sid = %self.metadata.call_sid, error = %e, "Synthesis failed");
                metrics::counter!("callbridge_provider_errors_total", "provider" => "tts")
                    .increment(1);
                self.flags.set_speaking(false);
                return false;
            },
        };
        // The provider charges for synthesis whether or not playback finishes
        self.costs.add_tts(text.chars().count());

        let ratio = self.ctx.tts.config().downsample_ratio();
        let encoded = downsample_and_encode(&pcm, ratio);
        let total_frames = encoded.len().div_ceil(FRAME_BYTES);

        let sent = send_frames(&self.flags, &self.outbound, &encoded).await;
        let complete = sent == total_frames && !self.flags.stop_requested();

        if complete {
            let mark = Uuid::new_v4().to_string();
            let _ = self.outbound.send(OutboundEvent::Mark(mark)).await;

            if settle {
                // Frames are queued far faster than the 20ms-per-frame
                // playback rate; hold the speaking window open until the
                // audio has actually played out
                let playback_ms = sent as u64 * 20 + self.ctx.config.playback.settle_ms;
                tokio::time::sleep(Duration::from_millis(playback_ms)).await;
            }
        }

        self.flags.set_speaking(false);
        complete
    }

    fn record_assistant(&mut self, text: &str) {
        self.history.push(Turn::assistant(text));
        self.transcript.push(TranscriptEntry::new(TurnRole::Assistant, text));
    }

    async fn finalize(mut self, reason: EndReason) {
        self.flags.set_speaking(false);

        let duration_secs = self.started_at.elapsed().as_secs_f64();
        let summary = self.summarize().await;
        let costs = self.costs.finalize(duration_secs);

        let billing_result = self
            .ctx
            .billing
            .deduct(&self.metadata.user_id, costs.charged, &self.metadata.call_sid)
            .await;
        if let Err(e) = &billing_result {
            tracing::warn!(
                call_sid = %self.metadata.call_sid,
                user_id = %self.metadata.user_id,
                error = %e,
                "Billing deduction failed"
            );
        }

        let status = match (reason, &billing_result) {
            (EndReason::Stopped, Ok(())) => CallStatus::Completed,
            (EndReason::Stopped, Err(_)) => CallStatus::BillingPending,
            (EndReason::Aborted, _) => CallStatus::Aborted,
        };

        metrics::counter!("callbridge_calls_finished_total", "status" => status.as_str())
            .increment(1);
        metrics::histogram!("callbridge_call_duration_seconds").record(duration_secs);

        let record = CallRecord {
            metadata: self.metadata.clone(),
            status,
            duration_secs,
            transcript: std::mem::take(&mut self.transcript),
            summary,
            costs,
            pipeline_id: self.pipeline_id.clone(),
            ended_at: Utc::now(),
        };

        if let Err(e) = self.ctx.store.record(&record).await {
            tracing::error!(
                call_sid = %self.metadata.call_sid,
                error = %e,
                "Failed to persist call record"
            );
        }

        tracing::info!(
            call_sid = %self.metadata.call_sid,
            status = %record.status.as_str(),
            duration_secs = record.duration_secs,
            charged = record.costs.charged,
            "Call finalized"
        );
    }

    /// Ask the chat provider for a short summary of the finished call.
    /// Failures degrade to an empty summary rather than blocking finalize.
    async fn summarize(&mut self) -> String {
        if self.transcript.is_empty() {
            return String::new();
        }

        let dialogue_text = self
            .transcript
            .iter()
            .map(|entry| format!("{}: {}", entry.speaker, entry.text))
            .collect::<Vec<_>>()
            .join("\n");

        let turns = vec![
            Turn::system(
                "Summarize this phone call in two or three sentences. \
                 State the caller's intent and the outcome.",
            ),
            Turn::user(dialogue_text),
        ];

        match self.ctx.chat.complete(&turns).await {
            Ok(outcome) => {
                self.costs.add_llm(outcome.prompt_tokens, outcome.completion_tokens);
                outcome.text.trim().to_string()
            },
            Err(e) => {
                tracing::warn!(call_sid = %self.metadata.call_sid, error = %e, "Summary request failed");
                String::new()
            },
        }
    }
}
