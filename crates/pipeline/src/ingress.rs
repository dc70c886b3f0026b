//! Media ingress task
//!
//! Owns everything frame-rate sensitive: the endpointer, the optional noise
//! suppressor, and the barge-in detector. While the agent is silent, frames
//! feed the endpointing state machine; while the agent speaks, frames are
//! only watched for a sustained interruption. The select loop also awaits
//! the endpointer's debounce deadline so an utterance is emitted exactly
//! once per pause.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use callbridge_audio::noise::NoiseSuppressor;
use callbridge_audio::vad::{BargeInDetector, Endpointer};
use callbridge_core::OutboundEvent;

use crate::orchestrator::{DialogueEvent, IngressEvent, PipelineConfig};
use crate::playback::PlaybackFlags;

pub(crate) struct Ingress {
    endpointer: Endpointer,
    noise: Option<NoiseSuppressor>,
    barge_in: BargeInDetector,
    flags: Arc<PlaybackFlags>,
    outbound: mpsc::Sender<OutboundEvent>,
    dialogue_tx: mpsc::Sender<DialogueEvent>,
}

impl Ingress {
    pub(crate) fn new(
        config: &PipelineConfig,
        flags: Arc<PlaybackFlags>,
        outbound: mpsc::Sender<OutboundEvent>,
        dialogue_tx: mpsc::Sender<DialogueEvent>,
    ) -> Self {
        let noise = config
            .noise
            .enabled
            .then(|| NoiseSuppressor::new(config.noise.suppressor.clone()));

        Self {
            endpointer: Endpointer::new(config.endpointer.clone()),
            noise,
            barge_in: BargeInDetector::new(config.barge_in.clone()),
            flags,
            outbound,
            dialogue_tx,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<IngressEvent>) {
        loop {
            let deadline = self.endpointer.deadline();
            let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(
                deadline.unwrap_or_else(Instant::now),
            ));

            tokio::select! {
                event = rx.recv() => match event {
                    Some(IngressEvent::Frame(mut frame)) => {
                        self.handle_frame(&mut frame).await;
                    },
                    Some(IngressEvent::Stop) => {
                        let _ = self.dialogue_tx.send(DialogueEvent::Stop).await;
                        break;
                    },
                    // Transport dropped without a stop event; closing the
                    // dialogue channel takes the aborted path
                    None => break,
                },
                _ = sleep, if deadline.is_some() => {
                    if let Some(utterance) = self.endpointer.fire() {
                        metrics::counter!("callbridge_utterances_total").increment(1);
                        metrics::histogram!("callbridge_utterance_bytes")
                            .record(utterance.len() as f64);
                        tracing::debug!(bytes = utterance.len(), "utterance complete");
                        if self.dialogue_tx.send(DialogueEvent::Utterance(utterance)).await.is_err() {
                            break;
                        }
                    }
                },
            }
        }
    }

    async fn handle_frame(&mut self, frame: &mut [u8]) {
        if self.flags.is_speaking() {
            let (verdict, features) = self.endpointer.classify(frame);
            if self.barge_in.observe(verdict, features) {
                tracing::info!("barge-in detected, stopping playback");
                metrics::counter!("callbridge_barge_ins_total").increment(1);
                self.flags.interrupt();
                let _ = self.outbound.send(OutboundEvent::Clear).await;
                self.endpointer.discard_utterance();
                self.barge_in.reset();
            }
            return;
        }

        self.barge_in.reset();
        if let Some(noise) = self.noise.as_mut() {
            noise.apply(frame, false);
        }
        self.endpointer.process(frame, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_audio::codec::linear_to_mulaw;
    use callbridge_audio::FRAME_BYTES;
    use std::time::Duration;

    fn frame_of(amplitude: i16) -> Vec<u8> {
        vec![linear_to_mulaw(amplitude); FRAME_BYTES]
    }

    fn spawn_ingress(
        config: PipelineConfig,
        flags: Arc<PlaybackFlags>,
    ) -> (
        mpsc::Sender<IngressEvent>,
        mpsc::Receiver<DialogueEvent>,
        mpsc::Receiver<OutboundEvent>,
    ) {
        let (media_tx, media_rx) = mpsc::channel(256);
        let (dialogue_tx, dialogue_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let ingress = Ingress::new(&config, flags, outbound_tx, dialogue_tx);
        tokio::spawn(ingress.run(media_rx));
        (media_tx, dialogue_rx, outbound_rx)
    }

    #[tokio::test]
    async fn test_utterance_emitted_after_debounce() {
        let mut config = PipelineConfig::default();
        config.endpointer.debounce_ms = 50;
        let flags = Arc::new(PlaybackFlags::new());
        let (media_tx, mut dialogue_rx, _outbound_rx) = spawn_ingress(config, flags);

        for _ in 0..10 {
            media_tx.send(IngressEvent::Frame(frame_of(18000))).await.unwrap();
        }
        for _ in 0..5 {
            media_tx.send(IngressEvent::Frame(frame_of(0))).await.unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(2), dialogue_rx.recv())
            .await
            .expect("deadline should fire")
            .expect("channel open");
        match event {
            DialogueEvent::Utterance(bytes) => assert_eq!(bytes.len(), 10 * FRAME_BYTES),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_event_forwarded() {
        let flags = Arc::new(PlaybackFlags::new());
        let (media_tx, mut dialogue_rx, _outbound_rx) =
            spawn_ingress(PipelineConfig::default(), flags);

        media_tx.send(IngressEvent::Stop).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), dialogue_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, DialogueEvent::Stop));
    }

    #[tokio::test]
    async fn test_transport_drop_closes_dialogue_channel() {
        let flags = Arc::new(PlaybackFlags::new());
        let (media_tx, mut dialogue_rx, _outbound_rx) =
            spawn_ingress(PipelineConfig::default(), flags);

        drop(media_tx);
        let event = tokio::time::timeout(Duration::from_secs(1), dialogue_rx.recv())
            .await
            .unwrap();
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_barge_in_interrupts_playback() {
        let flags = Arc::new(PlaybackFlags::new());
        flags.set_speaking(true);
        let (media_tx, mut dialogue_rx, mut outbound_rx) =
            spawn_ingress(PipelineConfig::default(), flags.clone());

        // Well past the consecutive-frame threshold
        for _ in 0..10 {
            media_tx.send(IngressEvent::Frame(frame_of(25000))).await.unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, OutboundEvent::Clear));
        assert!(flags.stop_requested());
        assert!(flags.response_cancelled());

        // The interrupting speech itself never becomes an utterance
        drop(media_tx);
        let next = tokio::time::timeout(Duration::from_secs(1), dialogue_rx.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
