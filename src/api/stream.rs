//! Telephony media-stream WebSocket handler
//!
//! The telephony provider connects here once per call. The handler waits
//! for the stream-start handshake, builds the call session, registers it,
//! and then pumps caller audio into the session until the provider stops
//! the stream or the session ends the call.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ApiState;
use crate::call::CallSession;
use crate::telephony::{InboundFrame, OutboundFrame, StartInfo, TelephonySink};

/// How long the provider gets to complete the stream-start handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// `GET /media-stream` (WebSocket upgrade)
pub async fn media_stream(
    State(state): State<ApiState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(state, socket))
}

async fn handle_stream(state: ApiState, socket: WebSocket) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let Some(start) = await_handshake(&mut ws_stream).await else {
        tracing::debug!("media stream closed before handshake");
        return;
    };
    let stream_sid = start.stream_sid.clone();
    let call_sid = start.call_sid.clone();
    tracing::info!(%stream_sid, %call_sid, "call started");

    // Writer task owns the sink; everything outbound goes through it
    let (frame_tx, mut frame_rx) = mpsc::channel::<OutboundFrame>(256);
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let raw = match serde_json::to_string(&frame) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unserializable frame");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(raw.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let cancel = CancellationToken::new();
    let sink = TelephonySink::new(stream_sid.clone(), frame_tx);
    let (session, channels) =
        CallSession::establish(&state.config, state.crm.clone(), start, sink, cancel.clone())
            .await;

    // Register only after the handshake and session setup succeeded
    state
        .registry
        .insert(stream_sid.clone(), call_sid.clone(), cancel.clone())
        .await;

    // Reader task: caller audio in, teardown on stop or close
    let audio_tx = channels.caller_audio_tx.clone();
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(incoming) = ws_stream.next().await {
            let raw = match incoming {
                Ok(Message::Text(raw)) => raw,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            match serde_json::from_str::<InboundFrame>(&raw) {
                Ok(InboundFrame::Media { media }) => {
                    if audio_tx.send(media.payload).await.is_err() {
                        break;
                    }
                }
                Ok(InboundFrame::Stop) => {
                    tracing::info!("stream stopped by provider");
                    break;
                }
                Ok(InboundFrame::Start { .. } | InboundFrame::Other) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed telephony frame");
                }
            }
        }
        reader_cancel.cancel();
    });

    session.run(channels).await;

    cancel.cancel();
    state.registry.remove(&stream_sid).await;
    reader.abort();
    writer.abort();
    tracing::info!(%stream_sid, %call_sid, "call torn down");
}

/// Read frames until the stream-start handshake arrives
async fn await_handshake(
    ws_stream: &mut futures::stream::SplitStream<WebSocket>,
) -> Option<StartInfo> {
    let handshake = async {
        while let Some(incoming) = ws_stream.next().await {
            let raw = match incoming {
                Ok(Message::Text(raw)) => raw,
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            };
            match serde_json::from_str::<InboundFrame>(&raw) {
                Ok(InboundFrame::Start { start }) => return Some(start),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed telephony frame");
                }
            }
        }
        None
    };
    tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake)
        .await
        .ok()
        .flatten()
}
