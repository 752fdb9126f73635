//! `GameState` -- the single struct persisted per room -- plus the fresh
//! defaults and the lenient migration pass described in spec.md §4.3/§4.6.

use crate::entity::Entity;
use crate::layout::ScaledConfig;
use crate::player::{Player, PlayerId};
use crate::rng::Mulberry32;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Solo,
    Coop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Countdown,
    WipeExit,
    WipeHold,
    WipeReveal,
    Playing,
    GameOver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub room_id: String,
    pub mode: GameMode,
    pub status: GameStatus,
    pub tick: u64,
    pub rng: Mulberry32,
    /// Monotonic counter behind every `"e_N"` entity id. Persisted alongside
    /// the rest of the state so ids are never recycled across a restart.
    #[serde(default)]
    pub next_entity_id: u64,
    #[serde(default)]
    pub countdown_remaining: Option<u32>,
    pub players: HashMap<PlayerId, Player>,
    #[serde(default)]
    pub ready_player_ids: Vec<PlayerId>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    pub wave: u32,
    pub lives: u32,
    pub score: u32,
    pub alien_direction: i32,
    #[serde(default)]
    pub wipe_ticks_remaining: Option<u32>,
    #[serde(default)]
    pub wipe_wave_number: Option<u32>,
    #[serde(default)]
    pub alien_shooting_disabled: bool,
    pub config: ScaledConfig,
}

impl Default for ScaledConfig {
    fn default() -> Self {
        ScaledConfig::for_player_count(0)
    }
}

impl GameState {
    /// The single source of truth for a freshly created room. `seed` is the
    /// only piece of real-world randomness this module ever accepts; it
    /// must come from outside the reducer (see `game-server`'s room setup).
    pub fn new(room_id: String, mode: GameMode, seed: u32) -> Self {
        GameState {
            room_id,
            mode,
            status: GameStatus::Waiting,
            tick: 0,
            rng: Mulberry32::new(seed),
            next_entity_id: 0,
            countdown_remaining: None,
            players: HashMap::new(),
            ready_player_ids: Vec::new(),
            entities: Vec::new(),
            wave: 1,
            lives: 0,
            score: 0,
            alien_direction: 1,
            wipe_ticks_remaining: None,
            wipe_wave_number: None,
            alien_shooting_disabled: false,
            config: ScaledConfig::for_player_count(0),
        }
    }

    /// Recomputes `config` from the current player count. Called whenever
    /// the roster changes (join/leave); the reducer itself always derives
    /// a fresh `ScaledConfig` from `players.len()` rather than trusting
    /// this cached copy, per the "never branch on a stored player count"
    /// design rule -- this field exists purely so a freshly joined client
    /// can learn the scaling without waiting for a tick.
    pub fn refresh_config(&mut self) {
        self.config = ScaledConfig::for_player_count(self.players.len());
    }

    pub fn lowest_free_slot(&self) -> Option<u8> {
        (1..=crate::layout::MAX_PLAYERS as u8).find(|slot| {
            !self.players.values().any(|p| p.slot == *slot)
        })
    }

    /// Clears a finished round back to a fresh `waiting` lobby when a join
    /// arrives after `game_over` (spec.md §4.5's join precondition is
    /// `status∈{waiting,game_over}`). Keeps `room_id`, `rng` and
    /// `next_entity_id` so entity ids stay monotonic for the room's entire
    /// lifetime rather than resetting per round; everything round-scoped
    /// (players, entities, score, wave, lives) starts over, matching "no
    /// session resumption" -- the prior round's roster doesn't carry into
    /// the new one.
    pub fn reset_for_new_round(&mut self) {
        self.status = GameStatus::Waiting;
        self.players.clear();
        self.ready_player_ids.clear();
        self.entities.clear();
        self.wave = 1;
        self.lives = 0;
        self.score = 0;
        self.alien_direction = 1;
        self.countdown_remaining = None;
        self.wipe_ticks_remaining = None;
        self.wipe_wave_number = None;
        self.alien_shooting_disabled = false;
        self.refresh_config();
    }

    /// Hands out the next `"e_N"` entity id and advances the counter. The
    /// only way an entity id is ever produced -- never from the RNG, so
    /// entity allocation never perturbs the random sequence collisions
    /// elsewhere in the tick depend on.
    pub fn alloc_entity_id(&mut self) -> String {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        format!("e_{id}")
    }
}

/// Fills in any field missing from a persisted (and therefore possibly
/// stale) JSON blob with the same defaults `GameState::new` would produce,
/// then re-derives anything that must stay internally consistent.
///
/// `room_id`/`seed` are only used as a fallback when the persisted value is
/// missing entirely (e.g. a record written by a version of the server that
/// predates a field); an otherwise-valid record keeps its own values.
pub fn migrate_game_state(value: serde_json::Value, room_id: &str, seed: u32) -> GameState {
    let fallback = GameState::new(room_id.to_string(), GameMode::Solo, seed);
    let mut state: GameState = match serde_json::from_value(value) {
        Ok(state) => state,
        Err(error) => {
            tracing::warn!(?error, room_id, "failed to deserialize persisted state, using defaults");
            return fallback;
        }
    };

    // Re-derive anything a partially-missing record could have left
    // inconsistent, matching the invariants promised in spec.md §3.
    match state.status {
        GameStatus::Playing | GameStatus::Waiting | GameStatus::GameOver => {
            state.wipe_ticks_remaining = None;
            state.wipe_wave_number = None;
        }
        GameStatus::Countdown => {
            state.wipe_ticks_remaining = None;
            state.wipe_wave_number = None;
            if state.countdown_remaining.is_none() {
                state.countdown_remaining = Some(crate::layout::COUNTDOWN_TICKS);
            }
        }
        GameStatus::WipeExit | GameStatus::WipeHold | GameStatus::WipeReveal => {
            state.countdown_remaining = None;
            if state.wipe_ticks_remaining.is_none() {
                state.wipe_ticks_remaining = Some(0);
            }
        }
    }
    if !matches!(state.status, GameStatus::Countdown) {
        state.countdown_remaining = None;
    }
    state
        .ready_player_ids
        .retain(|id| state.players.contains_key(id));
    state.refresh_config();
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_allocate_sequentially_without_reuse() {
        let mut state = GameState::new("ABC123".to_string(), GameMode::Solo, 7);
        let ids: Vec<String> = (0..5).map(|_| state.alloc_entity_id()).collect();
        assert_eq!(ids, vec!["e_0", "e_1", "e_2", "e_3", "e_4"]);
        assert_eq!(state.next_entity_id, 5);
    }

    #[test]
    fn fresh_defaults_round_trip_through_migration() {
        let fresh = GameState::new("ABC123".to_string(), GameMode::Solo, 7);
        let json = serde_json::to_value(&fresh).unwrap();
        let migrated = migrate_game_state(json, "ABC123", 7);
        assert_eq!(migrated.room_id, fresh.room_id);
        assert_eq!(migrated.status, fresh.status);
        assert_eq!(migrated.tick, fresh.tick);
        assert_eq!(migrated.wave, fresh.wave);
        assert_eq!(migrated.score, fresh.score);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let partial = serde_json::json!({
            "room_id": "ZZZ999",
            "mode": "coop",
            "status": "waiting",
            "tick": 12,
            "rng": {"seed": 99},
            "players": {},
            "wave": 1,
            "lives": 0,
            "score": 0,
            "alien_direction": 1,
            "config": {
                "alien_cols": 11, "alien_rows": 5, "move_interval_ticks": 18,
                "alien_shoot_rate": 0.016, "lives": 3
            }
        });
        let migrated = migrate_game_state(partial, "ZZZ999", 99);
        assert!(migrated.entities.is_empty());
        assert!(migrated.ready_player_ids.is_empty());
        assert_eq!(migrated.countdown_remaining, None);
    }
}
