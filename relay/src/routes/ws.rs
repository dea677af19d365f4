//! WebSocket handler: event fan-out between sessions.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register with the hub → send `session:connected` with
//!    `client_id`
//! 2. Client sends an `Event` frame → stamped with `from`, rebroadcast to
//!    every other session, sender receives an `Ack` with `delivered`
//! 3. Frames queued by peers → forwarded to this client
//! 4. Close → unregister
//!
//! Frames travel as binary protobuf. Text messages are accepted as JSON
//! frames so the relay can be poked with generic WebSocket tools.

#[cfg(test)]
#[path = "ws_test.rs"]
mod ws_test;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{Frame, SESSION_CONNECTED, Status};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hub::{CLIENT_QUEUE_CAPACITY, Hub};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(hub): State<Hub>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, hub))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, hub: Hub) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_QUEUE_CAPACITY);
    hub.join(client_id, client_tx).await;

    let welcome = Frame::event(SESSION_CONNECTED, json!({ "client_id": client_id.to_string() }));
    if send_frame(&mut socket, &welcome).await.is_err() {
        hub.part(client_id).await;
        return;
    }
    info!(%client_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let inbound = match msg {
                    Message::Binary(bytes) => decode_binary(&bytes),
                    Message::Text(text) => decode_text(text.as_str()),
                    Message::Close(_) => break,
                    _ => continue,
                };
                let replies = match inbound {
                    Ok(frame) => process_inbound(&hub, client_id, frame).await,
                    Err(message) => {
                        warn!(%client_id, error = %message, "ws: invalid inbound frame");
                        vec![Frame::event("gateway:error", json!({ "message": message }))]
                    }
                };
                if send_all(&mut socket, &replies).await.is_err() {
                    break;
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.part(client_id).await;
    info!(%client_id, "ws: client disconnected");
}

fn decode_binary(bytes: &[u8]) -> Result<Frame, String> {
    frames::decode_frame(bytes).map_err(|e| e.to_string())
}

fn decode_text(text: &str) -> Result<Frame, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid json: {e}"))
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Handle one inbound frame and return the frames owed to the sender.
///
/// Peers receive a copy with a fresh id, no `parent_id`, and `from` set to
/// the sender's client id.
async fn process_inbound(hub: &Hub, client_id: Uuid, frame: Frame) -> Vec<Frame> {
    match frame.status {
        Status::Event if frame.event.is_empty() => vec![frame.error("event name required")],
        Status::Event => {
            debug!(%client_id, id = %frame.id, event = %frame.event, "ws: recv event");
            let mut peer_frame = frame.clone().with_from(client_id.to_string());
            peer_frame.id = Uuid::new_v4().to_string();
            peer_frame.parent_id = None;
            let delivered = hub.broadcast(&peer_frame, Some(client_id)).await;
            info!(%client_id, event = %frame.event, delivered, "ws: relayed event");
            vec![frame.ack(json!({ "delivered": delivered }))]
        }
        Status::Ack | Status::Error => {
            debug!(%client_id, id = %frame.id, status = ?frame.status, "ws: ignoring client reply frame");
            vec![]
        }
    }
}

async fn send_all(socket: &mut WebSocket, batch: &[Frame]) -> Result<(), axum::Error> {
    for frame in batch {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    if frame.status == Status::Error {
        warn!(id = %frame.id, event = %frame.event, data = %frame.data, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, event = %frame.event, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Binary(frames::encode_frame(frame).into())).await
}
