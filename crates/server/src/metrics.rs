//! Prometheus metrics registration
//!
//! Installs the global recorder and describes every series the server and
//! pipeline emit. The handle renders the scrape payload for `/metrics`.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Returns `None` (and logs) when a
/// recorder is already installed, so tests and embedders stay quiet.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!("Failed to install metrics recorder: {}", e);
            return None;
        }
    };

    describe_counter!(
        "callbridge_calls_started_total",
        "Calls accepted and handed to a pipeline"
    );
    describe_counter!(
        "callbridge_calls_finished_total",
        "Finalized calls by terminal status"
    );
    describe_histogram!(
        "callbridge_call_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of finalized calls"
    );
    describe_counter!(
        "callbridge_utterances_total",
        "Complete utterances emitted by the endpointer"
    );
    describe_histogram!(
        "callbridge_utterance_bytes",
        Unit::Bytes,
        "Size of complete utterances in companded bytes"
    );
    describe_counter!("callbridge_barge_ins_total", "Playback interruptions by the caller");
    describe_counter!(
        "callbridge_provider_errors_total",
        "Failed provider requests by provider name"
    );
    describe_counter!(
        "callbridge_sessions_rejected_total",
        "Streams refused because the session capacity was reached"
    );
    describe_counter!(
        "callbridge_sessions_evicted_total",
        "Sessions removed by the staleness sweep"
    );
    describe_gauge!("callbridge_active_sessions", "Currently registered media streams");

    Some(handle)
}
