//! The queue of actions the reducer consumes in one tick. These are the
//! internal, already-authorized counterpart to the wire `ClientMessage`s --
//! the room maps an incoming message to a `PlayerAction` only once the
//! dispatch table's preconditions (status, attached player id) have been
//! checked.

use crate::player::PlayerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlayerAction {
    Input {
        player_id: PlayerId,
        left: bool,
        right: bool,
    },
    Move {
        player_id: PlayerId,
        direction: MoveDirection,
    },
    Shoot {
        player_id: PlayerId,
    },
    Forfeit {
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Left,
    Right,
}
