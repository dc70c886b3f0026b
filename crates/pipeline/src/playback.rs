//! Playback state shared between the ingress and dialogue tasks

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use tokio::sync::mpsc;

use callbridge_audio::FRAME_BYTES;
use callbridge_core::OutboundEvent;

/// Playback tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Extra pause after estimated playback before the next sentence
    pub settle_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { settle_ms: 300 }
    }
}

/// Atomic flags coordinating barge-in across the two call tasks.
///
/// The ingress task sets `stop` and `cancel` when an interruption is
/// detected; the dialogue task polls `stop` between frames and hands
/// `cancel` to the LLM stream reader. `speaking` gates the ingress task's
/// barge-in mode.
#[derive(Debug, Default)]
pub struct PlaybackFlags {
    speaking: AtomicBool,
    stop: AtomicBool,
    cancel: AtomicBool,
}

impl PlaybackFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::Relaxed);
    }

    /// Request that playback stop and the in-flight response be abandoned
    pub fn interrupt(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn response_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// The raw cancel flag, polled by the LLM stream reader
    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    /// Re-arm before handling a new utterance
    pub fn clear_interrupt(&self) {
        self.stop.store(false, Ordering::Relaxed);
        self.cancel.store(false, Ordering::Relaxed);
    }
}

/// Push encoded audio to the outbound channel in telephony-sized frames,
/// checking the stop flag before each one. Returns the number of frames
/// actually sent.
pub async fn send_frames(
    flags: &PlaybackFlags,
    outbound: &mpsc::Sender<OutboundEvent>,
    audio: &[u8],
) -> usize {
    let mut sent = 0;
    for chunk in audio.chunks(FRAME_BYTES) {
        if flags.stop_requested() {
            break;
        }
        if outbound.send(OutboundEvent::Media(chunk.to_vec())).await.is_err() {
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_frames_chunks_audio() {
        let flags = PlaybackFlags::new();
        let (tx, mut rx) = mpsc::channel(16);

        let audio = vec![0x7Fu8; FRAME_BYTES * 2 + 40];
        let sent = send_frames(&flags, &tx, &audio).await;
        assert_eq!(sent, 3);

        let mut lens = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let OutboundEvent::Media(bytes) = event {
                lens.push(bytes.len());
            }
        }
        assert_eq!(lens, vec![FRAME_BYTES, FRAME_BYTES, 40]);
    }

    #[tokio::test]
    async fn test_send_frames_stops_on_interrupt() {
        let flags = PlaybackFlags::new();
        flags.interrupt();
        let (tx, mut rx) = mpsc::channel(16);

        let audio = vec![0x7Fu8; FRAME_BYTES * 4];
        let sent = send_frames(&flags, &tx, &audio).await;
        assert_eq!(sent, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_interrupt_and_rearm() {
        let flags = PlaybackFlags::new();
        assert!(!flags.stop_requested());

        flags.interrupt();
        assert!(flags.stop_requested());
        assert!(flags.response_cancelled());

        flags.clear_interrupt();
        assert!(!flags.stop_requested());
        assert!(!flags.response_cancelled());
    }
}
