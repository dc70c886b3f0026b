//! Media-stream WebSocket transport
//!
//! One socket carries one call. The read loop parses protocol events and
//! feeds the pipeline through the registry; once the stream is registered,
//! the write half moves into a dedicated task that drains the pipeline's
//! outbound channel. Closing the socket without a stop event tears the
//! session down through the aborted path.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use callbridge_core::{OutboundEvent, PromptConfig};
use callbridge_persistence::PromptStore;
use callbridge_pipeline::{spawn_call, IngressEvent};

use crate::protocol::{InboundMessage, OutboundMessage};
use crate::state::AppState;
use crate::ServerError;

/// Handle a media-stream WebSocket upgrade
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();

    // The write half stays here until the start event registers the stream,
    // then moves into the writer task for the rest of the call.
    let mut sink = Some(sender);
    let mut active: Option<String> = None;

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket read error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let inbound: InboundMessage = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unparseable media-stream message");
                continue;
            }
        };

        match inbound {
            InboundMessage::Connected => {
                tracing::debug!("Media stream connected");
            }

            InboundMessage::Start { start } => {
                if active.is_some() {
                    tracing::warn!("Duplicate start event on an active stream, ignoring");
                    continue;
                }

                let metadata = start.into_metadata();
                let stream_sid = metadata.stream_sid.clone();
                let call_sid = metadata.call_sid.clone();

                let prompt = resolve_prompt(state.prompts.as_ref(), &metadata.prompt_id).await;
                let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundEvent>(256);

                let pipeline = state.pipeline.clone();
                let result = state.registry.create(&stream_sid, &call_sid, || {
                    spawn_call(pipeline, metadata, prompt, outbound_tx)
                });

                match result {
                    Ok(()) => {
                        if let Some(sender) = sink.take() {
                            tokio::spawn(run_writer(sender, outbound_rx, stream_sid.clone()));
                        }
                        active = Some(stream_sid);
                    }
                    Err(ServerError::CapacityExceeded) => {
                        if let Some(mut sender) = sink.take() {
                            let _ = sender
                                .send(Message::Close(Some(CloseFrame {
                                    code: close_code::AGAIN,
                                    reason: "server at capacity".into(),
                                })))
                                .await;
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            stream_sid = %stream_sid,
                            error = %e,
                            "Failed to register stream"
                        );
                        break;
                    }
                }
            }

            InboundMessage::Media { stream_sid, media } => {
                let Some(media_tx) = state.registry.media_sender(&stream_sid) else {
                    tracing::debug!(stream_sid = %stream_sid, "Media for unregistered stream");
                    continue;
                };

                let frame = match media.decode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding undecodable media payload");
                        continue;
                    }
                };

                if media_tx.send(IngressEvent::Frame(frame)).await.is_err() {
                    tracing::debug!(stream_sid = %stream_sid, "Pipeline gone, dropping frame");
                }
            }

            InboundMessage::Stop { stream_sid, stop } => {
                tracing::info!(
                    stream_sid = %stream_sid,
                    call_sid = %stop.call_sid,
                    "Stream stop received"
                );

                if let Some(media_tx) = state.registry.media_sender(&stream_sid) {
                    let _ = media_tx.send(IngressEvent::Stop).await;
                }
                state.registry.remove(&stream_sid);
                active = None;
                break;
            }

            InboundMessage::Mark { mark, .. } => {
                tracing::trace!(name = %mark.name, "Mark acknowledged");
            }

            InboundMessage::Unknown => {
                tracing::trace!("Ignoring unhandled media-stream event");
            }
        }
    }

    // Socket closed without a stop event; deregistering drops the pipeline
    // handle and the call finalizes as aborted.
    if let Some(stream_sid) = active {
        if state.registry.remove(&stream_sid).is_some() {
            tracing::warn!(stream_sid = %stream_sid, "Socket closed without stop, aborting call");
        }
    }
}

/// Resolve the prompt reference from the start event, falling back to the
/// built-in default when the reference is absent, unknown, or the lookup
/// fails. A call is never refused over prompt configuration.
async fn resolve_prompt(prompts: &dyn PromptStore, prompt_id: &str) -> PromptConfig {
    if prompt_id.is_empty() {
        return PromptConfig::default();
    }

    match prompts.resolve(prompt_id).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::info!(prompt_id = %prompt_id, "Unknown prompt id, using default prompt");
            PromptConfig::default()
        }
        Err(e) => {
            tracing::warn!(
                prompt_id = %prompt_id,
                error = %e,
                "Prompt lookup failed, using default prompt"
            );
            PromptConfig::default()
        }
    }
}

/// Drain the pipeline's outbound events into protocol frames. Ends when the
/// pipeline drops its senders, then closes the socket.
async fn run_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<OutboundEvent>,
    stream_sid: String,
) {
    while let Some(event) = outbound_rx.recv().await {
        let message = OutboundMessage::from_event(&stream_sid, event);
        match serde_json::to_string(&message) {
            Ok(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    tracing::debug!(stream_sid = %stream_sid, "Socket gone, writer exiting");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound message");
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}
