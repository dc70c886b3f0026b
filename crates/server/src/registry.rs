//! Session registry
//!
//! Tracks the pipeline handle for every live media stream, keyed by stream
//! identifier with a secondary call-sid index. Capacity is enforced before
//! any pipeline work is spawned, and a background sweep evicts sessions that
//! outlive the staleness bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use callbridge_pipeline::{CallHandle, IngressEvent};

use crate::ServerError;

/// One live media stream and its pipeline handle
pub struct SessionEntry {
    pub handle: CallHandle,
    pub call_sid: String,
    pub created_at: Instant,
}

/// Point-in-time view of a session for the HTTP listing endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub stream_sid: String,
    pub call_sid: String,
    pub pipeline_id: String,
    pub age_secs: u64,
    pub finished: bool,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionEntry>,
    by_call: HashMap<String, String>,
}

/// Registry of active call sessions
pub struct SessionRegistry {
    inner: RwLock<Inner>,
    max_sessions: usize,
    sweep_interval: Duration,
    stale_after: Duration,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, sweep_interval: Duration, stale_after: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_sessions,
            sweep_interval,
            stale_after,
        }
    }

    /// Register a new stream, spawning its pipeline only after the capacity
    /// and duplicate checks pass. The closure runs under the registry lock,
    /// so a burst of concurrent starts cannot overshoot the bound.
    pub fn create<F>(&self, stream_sid: &str, call_sid: &str, spawn: F) -> Result<(), ServerError>
    where
        F: FnOnce() -> CallHandle,
    {
        let mut inner = self.inner.write();

        if inner.sessions.len() >= self.max_sessions {
            metrics::counter!("callbridge_sessions_rejected_total").increment(1);
            tracing::warn!(
                stream_sid = %stream_sid,
                active = inner.sessions.len(),
                max = self.max_sessions,
                "Rejecting stream, session capacity reached"
            );
            return Err(ServerError::CapacityExceeded);
        }

        if inner.sessions.contains_key(stream_sid) {
            return Err(ServerError::DuplicateStream(stream_sid.to_string()));
        }

        let handle = spawn();
        inner.sessions.insert(
            stream_sid.to_string(),
            SessionEntry {
                handle,
                call_sid: call_sid.to_string(),
                created_at: Instant::now(),
            },
        );
        inner.by_call.insert(call_sid.to_string(), stream_sid.to_string());
        metrics::gauge!("callbridge_active_sessions").set(inner.sessions.len() as f64);

        Ok(())
    }

    /// Sender for a stream's media frames, if the stream is registered
    pub fn media_sender(&self, stream_sid: &str) -> Option<mpsc::Sender<IngressEvent>> {
        self.inner.read().sessions.get(stream_sid).map(|entry| entry.handle.media_tx.clone())
    }

    /// Reverse lookup from call sid to stream sid
    pub fn find_by_call(&self, call_sid: &str) -> Option<String> {
        self.inner.read().by_call.get(call_sid).cloned()
    }

    /// Deregister a stream. Dropping the returned entry (and with it the
    /// pipeline handle) closes the media channel, which winds the call down
    /// through the aborted path unless a stop event already completed it.
    pub fn remove(&self, stream_sid: &str) -> Option<SessionEntry> {
        let mut inner = self.inner.write();
        let entry = inner.sessions.remove(stream_sid)?;
        inner.by_call.remove(&entry.call_sid);
        metrics::gauge!("callbridge_active_sessions").set(inner.sessions.len() as f64);
        Some(entry)
    }

    pub fn count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn list(&self) -> Vec<SessionSnapshot> {
        self.inner
            .read()
            .sessions
            .iter()
            .map(|(stream_sid, entry)| SessionSnapshot {
                stream_sid: stream_sid.clone(),
                call_sid: entry.call_sid.clone(),
                pipeline_id: entry.handle.pipeline_id.clone(),
                age_secs: entry.created_at.elapsed().as_secs(),
                finished: entry.handle.finished(),
            })
            .collect()
    }

    /// Evict every session older than the staleness bound, regardless of
    /// activity. Returns the number of sessions evicted.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > self.stale_after)
            .map(|(stream_sid, _)| stream_sid.clone())
            .collect();

        for stream_sid in &stale {
            if let Some(entry) = inner.sessions.remove(stream_sid) {
                inner.by_call.remove(&entry.call_sid);
                tracing::warn!(
                    stream_sid = %stream_sid,
                    call_sid = %entry.call_sid,
                    age_secs = entry.created_at.elapsed().as_secs(),
                    "Evicting stale session"
                );
            }
        }

        if !stale.is_empty() {
            metrics::counter!("callbridge_sessions_evicted_total").increment(stale.len() as u64);
            metrics::gauge!("callbridge_active_sessions").set(inner.sessions.len() as f64);
        }

        stale.len()
    }

    /// Spawn the periodic staleness sweep. Returns a shutdown sender; send
    /// `true` to stop the task.
    pub fn start_sweep_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = registry.sweep();
                        if evicted > 0 {
                            tracing::info!(evicted, "Session sweep complete");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("Session sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::{CallMetadata, PromptConfig};
    use callbridge_persistence::{InMemoryBillingService, InMemoryCallStore};
    use callbridge_pipeline::{spawn_call, PipelineConfig, PipelineContext};
    use callbridge_providers::{
        ChatClient, ChatConfig, SynthesisClient, SynthesisConfig, TranscriptionClient,
        TranscriptionConfig,
    };

    fn test_ctx() -> Arc<PipelineContext> {
        // Providers point at closed ports; nothing in these tests reaches them
        let stt = TranscriptionClient::new(TranscriptionConfig {
            url: "http://127.0.0.1:9/v1/transcribe".to_string(),
            timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();
        let chat = ChatClient::new(ChatConfig {
            url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();
        let tts = SynthesisClient::new(SynthesisConfig {
            url: "http://127.0.0.1:9/v1/synthesize".to_string(),
            timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();

        Arc::new(PipelineContext {
            stt,
            chat,
            tts,
            store: Arc::new(InMemoryCallStore::new()),
            billing: Arc::new(InMemoryBillingService::new()),
            config: PipelineConfig::default(),
        })
    }

    fn spawn_test_call(ctx: &Arc<PipelineContext>, call_sid: &str, stream_sid: &str) -> CallHandle {
        let metadata = CallMetadata {
            call_sid: call_sid.to_string(),
            stream_sid: stream_sid.to_string(),
            ..Default::default()
        };
        let prompt = PromptConfig { greeting: String::new(), ..Default::default() };
        let (outbound_tx, _outbound_rx) = mpsc::channel(64);
        spawn_call(ctx.clone(), metadata, prompt, outbound_tx)
    }

    fn registry(max: usize) -> SessionRegistry {
        SessionRegistry::new(max, Duration::from_secs(60), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_create_find_remove() {
        let ctx = test_ctx();
        let registry = registry(10);

        registry
            .create("MZ1", "CA1", || spawn_test_call(&ctx, "CA1", "MZ1"))
            .unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.media_sender("MZ1").is_some());
        assert_eq!(registry.find_by_call("CA1").as_deref(), Some("MZ1"));

        let entry = registry.remove("MZ1").expect("entry present");
        assert_eq!(entry.call_sid, "CA1");
        assert_eq!(registry.count(), 0);
        assert!(registry.media_sender("MZ1").is_none());
        assert!(registry.find_by_call("CA1").is_none());
    }

    #[tokio::test]
    async fn test_capacity_rejection_spawns_nothing() {
        let ctx = test_ctx();
        let registry = registry(1);

        registry
            .create("MZ1", "CA1", || spawn_test_call(&ctx, "CA1", "MZ1"))
            .unwrap();

        let mut spawned = false;
        let err = registry
            .create("MZ2", "CA2", || {
                spawned = true;
                spawn_test_call(&ctx, "CA2", "MZ2")
            })
            .unwrap_err();

        assert!(matches!(err, ServerError::CapacityExceeded));
        assert!(!spawned);
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_stream_rejected() {
        let ctx = test_ctx();
        let registry = registry(10);

        registry
            .create("MZ1", "CA1", || spawn_test_call(&ctx, "CA1", "MZ1"))
            .unwrap();
        let err = registry
            .create("MZ1", "CA2", || spawn_test_call(&ctx, "CA2", "MZ1"))
            .unwrap_err();

        assert!(matches!(err, ServerError::DuplicateStream(_)));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_by_age_only() {
        let ctx = test_ctx();
        let registry =
            SessionRegistry::new(10, Duration::from_secs(60), Duration::from_secs(0));

        registry
            .create("MZ1", "CA1", || spawn_test_call(&ctx, "CA1", "MZ1"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.count(), 0);
        assert!(registry.find_by_call("CA1").is_none());
    }

    #[tokio::test]
    async fn test_list_snapshots() {
        let ctx = test_ctx();
        let registry = registry(10);
        registry
            .create("MZ1", "CA1", || spawn_test_call(&ctx, "CA1", "MZ1"))
            .unwrap();

        let sessions = registry.list();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].stream_sid, "MZ1");
        assert_eq!(sessions[0].call_sid, "CA1");
        assert!(!sessions[0].pipeline_id.is_empty());
    }
}
