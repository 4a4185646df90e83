//! WebSocket transport: frames a connection's [`crate::session::Session`]
//! onto a real socket.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::{self, Envelope};
use crate::session::{Dispatcher, Session};

/// Drives one accepted WebSocket connection end to end: sends the
/// handshake, then loops reading requests and forwarding fan-out
/// deliveries until the socket closes.
pub async fn run(socket: WebSocket, dispatcher: Arc<Dispatcher>, host: String) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();

    let session = Session::new(dispatcher, outbound_tx);
    info!(channel = session.channel.raw(), "session connecting");

    let handshake = Envelope::Handshake { timestamp_ms: now_millis(), host };
    if send(&mut sink, &handshake).await.is_err() {
        session.close();
        return;
    }

    // One task owns the sink and is the only writer, so the handshake, OK
    // frames (sent inline below), and fan-out deliveries (sent here) never
    // interleave mid-frame. Both streams fold onto this single task by
    // select!-ing between the inbound read loop and the outbound queue.
    let mut closing = false;
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(envelope) => {
                        if send(&mut sink, &envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next(), if !closing => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match handle_frame(&mut stream, text.as_bytes().to_vec()).await {
                            FrameOutcome::Request(bytes) => {
                                if bytes.is_empty() {
                                    continue; // `0` prefix frame: no-op
                                }
                                match codec::decode(&bytes) {
                                    Ok(req) => {
                                        if let Some(ok) = session.handle(req).await {
                                            if send(&mut sink, &ok).await.is_err() {
                                                break;
                                            }
                                        }
                                    }
                                    Err(err) => warn!(%err, "malformed request, dropping"),
                                }
                            }
                            FrameOutcome::ReadError => break,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        closing = true;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary/ping/pong frames carry no Flakbase payload.
                    }
                    Some(Err(err)) => {
                        warn!(%err, "read error, closing session");
                        break;
                    }
                }
            }
        }
    }

    debug!(channel = session.channel.raw(), "session closing, unregistering listeners");
    session.close();
}

enum FrameOutcome {
    Request(Vec<u8>),
    ReadError,
}

/// Handles the multi-frame request protocol: a leading numeric frame `N`
/// means "concatenate the next N frame payloads verbatim and decode that
/// as one request"; `0` is a no-op.
async fn handle_frame(
    stream: &mut futures::stream::SplitStream<WebSocket>,
    first_payload: Vec<u8>,
) -> FrameOutcome {
    let as_str = String::from_utf8_lossy(&first_payload);
    if let Ok(count) = as_str.trim().parse::<u64>() {
        // Only treat this as a frame-count prefix if the payload really is
        // a bare number, matching the original's `json.Unmarshal` type
        // switch on `float64` vs. `map[string]interface{}`.
        if serde_json::from_str::<serde_json::Value>(&as_str)
            .map(|v| v.is_number())
            .unwrap_or(false)
        {
            if count == 0 {
                return FrameOutcome::Request(Vec::new());
            }
            let mut buffer = Vec::new();
            for _ in 0..count {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => buffer.extend_from_slice(text.as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => buffer.extend_from_slice(&bytes),
                    _ => return FrameOutcome::ReadError,
                }
            }
            return FrameOutcome::Request(buffer);
        }
    }
    FrameOutcome::Request(first_payload)
}

async fn send(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let text = envelope.to_json().to_string();
    sink.send(Message::Text(text.into())).await
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}
