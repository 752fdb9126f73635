//! The 15 named events the reducer (and the room, for connection-lifecycle
//! events that never touch the reducer) can emit. Wire-identical to the
//! `{type:"event", name, data}` envelope described in spec.md §6 -- the
//! room serializes one of these per emission, the `name` comes from
//! `#[serde(tag = "name", content = "data")]`.

use crate::player::{Player, PlayerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Alien,
    Ufo,
    /// Reserved for future extensions; the reducer never emits this today.
    Commander,
    /// Reserved for future extensions; the reducer never emits this today.
    WaveBonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Victory,
    Defeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "snake_case")]
pub enum GameEvent {
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        player_id: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PlayerReady {
        player_id: PlayerId,
    },
    PlayerUnready {
        player_id: PlayerId,
    },
    PlayerDied {
        player_id: PlayerId,
    },
    PlayerRespawned {
        player_id: PlayerId,
    },
    CountdownTick {
        count: u32,
    },
    CountdownCancelled {
        reason: String,
    },
    GameStart,
    AlienKilled {
        alien_id: String,
        player_id: Option<PlayerId>,
    },
    ScoreAwarded {
        player_id: Option<PlayerId>,
        points: u32,
        source: ScoreSource,
    },
    WaveComplete {
        wave: u32,
    },
    GameOver {
        result: GameResult,
    },
    Invasion,
    UfoSpawn {
        x: i32,
    },
}
