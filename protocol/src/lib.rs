//! Wire schema shared between the server and every client. A room never
//! speaks anything but these two enums over its WebSocket; both sides tag
//! on `type`, so either one can add a variant without breaking readers that
//! don't recognize it yet (they simply fail `serde` on that one message).
//!
//! This crate re-exports the simulation DTOs from `game-core` rather than
//! duplicating them -- `GameState`, `Entity` and `GameEvent` already derive
//! `Serialize`/`Deserialize` in the shape the wire needs.

use game_core::{GameEvent, GameState, MoveDirection, ScaledConfig};
use serde::{Deserialize, Serialize};

pub use game_core::{Entity, EntityKind, Player, PlayerId};

/// Sent by a client over an already-attached WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach to the room as a named player. Must be the first message.
    Join { name: String },
    Ready,
    Unready,
    /// Solo mode skips the lobby and starts immediately.
    StartSolo,
    Forfeit,
    Input { left: bool, right: bool },
    Move { direction: MoveDirection },
    Shoot,
    Ping,
}

/// Sent by the server to every attached client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full authoritative state, sent on join and after every tick.
    /// `player_id`/`config` are only populated on the first sync to a newly
    /// joined connection -- the client caches both and every later sync
    /// omits them.
    Sync {
        state: GameState,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<ScaledConfig>,
    },
    Event { event: GameEvent },
    Pong,
    Error { code: ErrorCode, message: String },
}

/// Stable, machine-matchable error identifiers. Clients should switch on
/// `code`, not on `message` -- the text is for logs and humans only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RoomFull,
    GameInProgress,
    InvalidRoom,
    InvalidAction,
    InvalidMessage,
    NameTaken,
    NotInRoom,
    RateLimited,
    CountdownInProgress,
}

impl ErrorCode {
    /// A short, human-readable description. Not sent over the wire.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::RoomFull => "the room has reached its player limit",
            ErrorCode::GameInProgress => "a game is already in progress",
            ErrorCode::InvalidRoom => "no room exists with that code",
            ErrorCode::InvalidAction => "that action isn't valid right now",
            ErrorCode::InvalidMessage => "the message couldn't be parsed",
            ErrorCode::NameTaken => "that name is already in use in this room",
            ErrorCode::NotInRoom => "you must join before doing that",
            ErrorCode::RateLimited => "too many messages, slow down",
            ErrorCode::CountdownInProgress => "the countdown can't be interrupted that way",
        }
    }
}
