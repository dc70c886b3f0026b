//! Per-call task wiring
//!
//! `spawn_call` builds the ingress/dialogue pair for one media stream and
//! hands back a [`CallHandle`]. Dropping the handle closes the media channel,
//! which winds both tasks down through the aborted-call path; a stop event
//! arriving on the channel winds them down through the completed path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use callbridge_audio::noise::NoiseSuppressorConfig;
use callbridge_audio::vad::{BargeInConfig, EndpointerConfig};
use callbridge_core::{CallMetadata, OutboundEvent, PromptConfig};
use callbridge_persistence::{BillingService, CallRecordStore};
use callbridge_providers::{ChatClient, SynthesisClient, TranscriptionClient};
use serde::Deserialize;

use crate::costs::CostRates;
use crate::dialogue::Dialogue;
use crate::ingress::Ingress;
use crate::playback::{PlaybackConfig, PlaybackFlags};

/// Noise suppression settings. Disabled by default; suppression helps on
/// noisy lines but costs a little clarity on clean ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub enabled: bool,
    pub suppressor: NoiseSuppressorConfig,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self { enabled: false, suppressor: NoiseSuppressorConfig::default() }
    }
}

/// Pipeline tuning shared by every call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub endpointer: EndpointerConfig,
    pub barge_in: BargeInConfig,
    pub noise: NoiseConfig,
    pub playback: PlaybackConfig,
    pub rates: CostRates,
}

/// Provider clients and stores shared by every call. Built once at startup
/// and handed to each call behind an `Arc`.
pub struct PipelineContext {
    pub stt: TranscriptionClient,
    pub chat: ChatClient,
    pub tts: SynthesisClient,
    pub store: Arc<dyn CallRecordStore>,
    pub billing: Arc<dyn BillingService>,
    pub config: PipelineConfig,
}

/// Messages from the transport into the ingress task
#[derive(Debug)]
pub enum IngressEvent {
    /// One decoded media frame of mu-law bytes
    Frame(Vec<u8>),
    /// The stream's stop event arrived
    Stop,
}

/// Messages from the ingress task into the dialogue task
#[derive(Debug)]
pub(crate) enum DialogueEvent {
    /// A completed utterance of mu-law bytes
    Utterance(Vec<u8>),
    Stop,
}

/// Handle to one running call
pub struct CallHandle {
    /// Transport-facing sender for media frames and the stop event
    pub media_tx: mpsc::Sender<IngressEvent>,
    /// Identifier of the pipeline instance serving this call
    pub pipeline_id: String,
    dialogue: JoinHandle<()>,
    #[allow(dead_code)]
    ingress: JoinHandle<()>,
}

impl CallHandle {
    /// Whether the call has been finalized (record persisted)
    pub fn finished(&self) -> bool {
        self.dialogue.is_finished()
    }
}

/// Spawn the task pair for one call.
pub fn spawn_call(
    ctx: Arc<PipelineContext>,
    metadata: CallMetadata,
    prompt: PromptConfig,
    outbound: mpsc::Sender<OutboundEvent>,
) -> CallHandle {
    let pipeline_id = Uuid::new_v4().to_string();
    let flags = Arc::new(PlaybackFlags::new());

    // Media frames arrive every 20ms; the buffer rides out scheduling hiccups
    let (media_tx, media_rx) = mpsc::channel(256);
    let (dialogue_tx, dialogue_rx) = mpsc::channel(8);

    tracing::info!(
        call_sid = %metadata.call_sid,
        stream_sid = %metadata.stream_sid,
        pipeline_id = %pipeline_id,
        "Starting call pipeline"
    );
    metrics::counter!("callbridge_calls_started_total").increment(1);

    let ingress = Ingress::new(&ctx.config, flags.clone(), outbound.clone(), dialogue_tx);
    let ingress_task = tokio::spawn(ingress.run(media_rx));

    let dialogue = Dialogue::new(ctx, metadata, prompt, flags, outbound, pipeline_id.clone());
    let dialogue_task = tokio::spawn(dialogue.run(dialogue_rx));

    CallHandle { media_tx, pipeline_id, dialogue: dialogue_task, ingress: ingress_task }
}
