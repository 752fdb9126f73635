//! Canonical constants and the formation/barrier factories.
//!
//! Nothing here touches randomness or time; it is the single source of
//! truth for "how big is the grid", "where do things start" and "how does
//! the per-player-count table scale the simulation".

use crate::entity::{AlienType, Entity};

/// Playfield size in cells. Top-left origin, x right, y down.
pub const GRID_WIDTH: i32 = 120;
pub const GRID_HEIGHT: i32 = 36;

pub const TICK_RATE_HZ: u32 = 30;
pub const TICK_INTERVAL_MS: u64 = 33;

/// Player row is fixed; only x varies.
pub const PLAYER_Y: i32 = 34;
pub const PLAYER_MIN_X: i32 = 2;
pub const PLAYER_MAX_X: i32 = GRID_WIDTH - 3;

/// Aliens reaching this row trigger an immediate invasion defeat.
pub const GAME_OVER_Y: i32 = 30;

pub const ALIEN_MIN_X: i32 = 1;
pub const ALIEN_MAX_X: i32 = GRID_WIDTH - 2;
pub const ALIEN_ROW_SPACING: i32 = 2;
pub const ALIEN_COL_SPACING: i32 = 4;
pub const ALIEN_START_X: i32 = 10;
pub const ALIEN_START_Y: i32 = 4;

/// Point collision half-extents used by every `check*Hit` routine.
pub const COLLISION_H: i32 = 2;
pub const COLLISION_V: i32 = 1;

pub const BASE_BULLET_SPEED: i32 = 1;
pub const PLAYER_MOVE_SPEED: i32 = 1;

/// Wipe phase durations, in ticks.
pub const EXIT_TICKS: u32 = 30;
pub const HOLD_TICKS: u32 = 30;
pub const REVEAL_TICKS: u32 = 60;

pub const COUNTDOWN_TICKS: u32 = 3;
pub const COUNTDOWN_INTERVAL_MS: u64 = 1000;

/// Ticks a dead player waits before respawning, lives permitting.
pub const RESPAWN_DELAY_TICKS: u64 = 60;

/// Minimum ticks between a player's consecutive shots.
pub const PLAYER_SHOT_COOLDOWN_TICKS: u64 = 12;

/// Low per-tick probability of a fresh UFO spawning while none is alive.
pub const UFO_SPAWN_CHANCE: f64 = 0.003;
pub const UFO_SPEED: i32 = 1;
pub const UFO_SCORE_FAMILY: [u32; 4] = [50, 100, 150, 300];

pub const BARRIER_COUNT: usize = 4;
pub const BARRIER_SEGMENT_COLS: i32 = 3;
pub const BARRIER_SEGMENT_ROWS: i32 = 2;
pub const BARRIER_Y: i32 = 27;
pub const BARRIER_MAX_HEALTH: u8 = 4;

/// Room capacity; spec.md hard-caps cooperative play at 4.
pub const MAX_PLAYERS: usize = 4;

/// Idle-room cleanup deadline once the last connection drops.
pub const ROOM_CLEANUP_SECS: u64 = 300;

/// Rate limit: messages allowed per rolling one-second window.
pub const RATE_LIMIT_PER_SECOND: u32 = 60;

/// The derived per-player-count tuning table from spec.md §4.3.
/// Never branch elsewhere on a raw player count; always go through this.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScaledConfig {
    pub alien_cols: i32,
    pub alien_rows: i32,
    pub move_interval_ticks: u32,
    pub alien_shoot_rate: f64,
    pub lives: u32,
}

impl ScaledConfig {
    pub fn for_player_count(n: usize) -> Self {
        match n {
            0 | 1 => ScaledConfig {
                alien_cols: 11,
                alien_rows: 5,
                move_interval_ticks: 18,
                alien_shoot_rate: 0.016,
                lives: 3,
            },
            2 => ScaledConfig {
                alien_cols: 13,
                alien_rows: 5,
                move_interval_ticks: 16,
                alien_shoot_rate: 0.020,
                lives: 5,
            },
            3 => ScaledConfig {
                alien_cols: 14,
                alien_rows: 6,
                move_interval_ticks: 14,
                alien_shoot_rate: 0.030,
                lives: 5,
            },
            _ => ScaledConfig {
                alien_cols: 15,
                alien_rows: 6,
                move_interval_ticks: 12,
                alien_shoot_rate: 0.042,
                lives: 5,
            },
        }
    }
}

/// Maps a 1..=4 slot to a stable display color name. Purely a label; the
/// server never renders anything, but the wire protocol exposes it so
/// clients can stay consistent about who is who.
pub fn player_slot_color(slot: u8) -> &'static str {
    match slot {
        1 => "green",
        2 => "cyan",
        3 => "magenta",
        4 => "yellow",
        _ => "white",
    }
}

/// Evenly distributes the 4 possible slots across the player's x range.
pub fn player_spawn_x(slot: u8) -> i32 {
    let span = PLAYER_MAX_X - PLAYER_MIN_X;
    let step = span / (MAX_PLAYERS as i32 + 1);
    PLAYER_MIN_X + step * slot as i32
}

/// Row 0 is Squid, rows 1-2 Crab, remaining rows Octopus -- the classic
/// three-row point split, stretched to cover however many rows the scaled
/// config asks for.
fn alien_type_for_row(row: i32) -> AlienType {
    match row {
        0 => AlienType::Squid,
        1 | 2 => AlienType::Crab,
        _ => AlienType::Octopus,
    }
}

/// Builds a fresh formation of `cols x rows` aliens, all `entering`.
pub fn build_formation(cols: i32, rows: i32) -> Vec<Entity> {
    let mut aliens = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        let alien_type = alien_type_for_row(row);
        for col in 0..cols {
            aliens.push(Entity::new_alien(row, col, alien_type));
        }
    }
    aliens
}

/// Builds the fixed set of barriers, each a small grid of full-health
/// segments, evenly spaced across the playfield.
pub fn build_barriers(count: usize) -> Vec<Entity> {
    let span = GRID_WIDTH - 2 * ALIEN_MIN_X;
    let step = span / (count as i32 + 1);
    (0..count)
        .map(|i| {
            let x = ALIEN_MIN_X + step * (i as i32 + 1);
            Entity::new_barrier(x, BARRIER_Y, BARRIER_SEGMENT_COLS, BARRIER_SEGMENT_ROWS)
        })
        .collect()
}
