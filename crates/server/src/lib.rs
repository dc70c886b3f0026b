//! Call bridge server
//!
//! Accepts telephony media-stream WebSocket connections, runs one voice
//! pipeline per call, and exposes HTTP endpoints for health, metrics, and
//! call record lookup.

pub mod http;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use registry::{SessionRegistry, SessionSnapshot};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Max sessions reached")]
    CapacityExceeded,

    #[error("Stream already registered: {0}")]
    DuplicateStream(String),
}
