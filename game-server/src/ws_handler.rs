//! Per-connection WebSocket pump.
//!
//! Mirrors the teacher's paired-task shape (`processing_module::handle_*_logic`:
//! one task owns the send half, one owns the receive half, whichever finishes
//! first aborts the other) but speaks the JSON `ClientMessage`/`ServerMessage`
//! protocol instead of the postcard relay frames, and talks to a room through
//! its [`RoomHandle`] mailbox instead of a raw broadcast channel.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, ErrorCode, ServerMessage};
use tokio::sync::mpsc;

use crate::room::RoomHandle;

/// Drives one upgraded connection end to end: waits for the mandatory first
/// `join`, then pumps messages in both directions until either side closes.
pub async fn run(socket: WebSocket, room: RoomHandle) {
    let (mut sender, mut receiver) = socket.split();

    let Some((player_id, outbox)) = await_join(&mut sender, &mut receiver, &room).await else {
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let send_task = tokio::spawn(send_loop(sender, outbox));
    let recv_room = room.clone();
    let recv_player = player_id.clone();
    let recv_task = tokio::spawn(receive_loop(receiver, recv_room, recv_player));

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    room.disconnect(player_id).await;
}

/// Reads WebSocket frames until a valid `{type:"join", name}` arrives,
/// rejecting anything else with `error{invalid_message}` / `not_in_room`
/// without tearing down the connection prematurely -- a client is allowed
/// a `ping` or two before it gets around to joining.
async fn await_join(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    room: &RoomHandle,
) -> Option<(String, mpsc::UnboundedReceiver<ServerMessage>)> {
    while let Some(frame) = receiver.next().await {
        let Ok(frame) = frame else {
            return None;
        };
        let Message::Text(text) = frame else {
            if matches!(frame, Message::Close(_)) {
                return None;
            }
            continue;
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Join { name }) => {
                return match room.join(name).await {
                    Ok(joined) => Some((joined.player_id, joined.outbox)),
                    Err(code) => {
                        send_one(sender, &ServerMessage::Error {
                            code,
                            message: code.description().to_string(),
                        })
                        .await;
                        None
                    }
                };
            }
            Ok(ClientMessage::Ping) => {
                send_one(sender, &ServerMessage::Pong).await;
            }
            Ok(_) => {
                send_one(sender, &ServerMessage::Error {
                    code: ErrorCode::NotInRoom,
                    message: ErrorCode::NotInRoom.description().to_string(),
                })
                .await;
            }
            Err(error) => {
                tracing::debug!(?error, "unparsable frame before join");
                send_one(sender, &ServerMessage::Error {
                    code: ErrorCode::InvalidMessage,
                    message: ErrorCode::InvalidMessage.description().to_string(),
                })
                .await;
            }
        }
    }
    None
}

async fn send_one(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
}

/// Forwards everything the room emits for this connection to the socket.
async fn send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbox.recv().await {
        let Ok(text) = serde_json::to_string(&message) else {
            tracing::error!("failed to serialize outgoing server message");
            continue;
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
}

/// Parses inbound frames and forwards them to the room's mailbox. A frame
/// that fails to parse is reported as a protocol error but never
/// disconnects the sender (spec.md §7).
async fn receive_loop(mut receiver: SplitStream<WebSocket>, room: RoomHandle, player_id: String) {
    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(_) => return,
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => room.send_message(player_id.clone(), message).await,
                Err(error) => {
                    tracing::debug!(?error, player = player_id, "dropping unparsable frame");
                    room.report_invalid_message(player_id.clone()).await;
                }
            },
            Message::Close(_) => return,
            _ => {}
        }
    }
}
