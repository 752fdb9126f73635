//! The `Player` entity. Unlike the tagged-union `Entity`, a player is a
//! plain struct -- there is only ever one shape of "player".

use serde::{Deserialize, Serialize};

pub type PlayerId = String;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputState {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub slot: u8,
    pub color: String,
    pub x: i32,
    pub lives: u32,
    pub alive: bool,
    pub kills: u32,
    pub last_shot_tick: u64,
    #[serde(default)]
    pub respawn_at_tick: Option<u64>,
    #[serde(default)]
    pub input_state: InputState,
}

impl Player {
    pub fn new(id: PlayerId, name: String, slot: u8) -> Self {
        Player {
            id,
            name,
            slot,
            color: crate::layout::player_slot_color(slot).to_string(),
            x: crate::layout::player_spawn_x(slot),
            lives: 0,
            alive: true,
            kills: 0,
            last_shot_tick: 0,
            respawn_at_tick: None,
            input_state: InputState::default(),
        }
    }

    pub fn recenter(&mut self) {
        self.x = crate::layout::player_spawn_x(self.slot);
    }
}
