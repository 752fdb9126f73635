//! The room directory: maps room codes to running [`RoomHandle`]s, creates
//! rooms on demand, and is the only thing that ever calls
//! `room::spawn_room`/`room::resume_room`. This generalizes the teacher's
//! `AppState { rooms: Mutex<HashMap<String, Room>> }` (`lobby.rs`) from "one
//! entry per relayed game" to "one actor task per Space Invaders room".

use std::collections::HashMap;
use std::sync::Arc;

use game_core::GameMode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::config::ServerConfig;
use crate::persistence::Persistence;
use crate::room::{self, RoomHandle};

const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub struct AppState {
    pub rooms: Mutex<HashMap<String, RoomHandle>>,
    pub config: RwLock<ServerConfig>,
    pub persistence: Arc<dyn Persistence>,
}

impl AppState {
    pub fn new(config: ServerConfig, persistence: Arc<dyn Persistence>) -> Self {
        AppState {
            rooms: Mutex::new(HashMap::new()),
            config: RwLock::new(config),
            persistence,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_code: String,
    pub player_count: usize,
    pub status: game_core::GameStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub room_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCodeResponse {
    pub room_code: String,
}

/// Generates a fresh 6-char base36 uppercase code, retrying on the (very
/// unlikely) collision with a room already live in `rooms`.
pub fn generate_room_code(existing: &HashMap<String, RoomHandle>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code: String = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

/// Spawns a fresh room actor for `room_code`, attempting to resume from
/// persisted state first (spec.md §4.6). Returns `None` if a room with
/// that code is already live.
pub async fn init_room(state: &Arc<AppState>, room_code: String) -> Option<RoomHandle> {
    let mut rooms = state.rooms.lock().await;
    if rooms.contains_key(&room_code) {
        return None;
    }

    let cfg = state.config.read().await;
    let tick_interval_ms = cfg.tick_interval_ms();
    let rate_limit = cfg.rate_limit_per_second;
    let idle_cleanup = cfg.idle_cleanup_secs;
    drop(cfg);

    let seed = rand::thread_rng().gen::<u32>();
    let handle = match state.persistence.load(&room_code).await {
        Ok(Some(persisted)) => {
            tracing::info!(room = room_code, "resuming room from persisted state");
            room::resume_room(
                room_code.clone(),
                persisted,
                seed,
                state.persistence.clone(),
                rate_limit,
                tick_interval_ms,
                idle_cleanup,
            )
        }
        Ok(None) => room::spawn_room(
            room_code.clone(),
            GameMode::Coop,
            seed,
            state.persistence.clone(),
            rate_limit,
            tick_interval_ms,
            idle_cleanup,
        ),
        Err(error) => {
            tracing::warn!(room = room_code, ?error, "failed to load persisted state, starting fresh");
            room::spawn_room(
                room_code.clone(),
                GameMode::Coop,
                seed,
                state.persistence.clone(),
                rate_limit,
                tick_interval_ms,
                idle_cleanup,
            )
        }
    };

    rooms.insert(room_code, handle.clone());
    Some(handle)
}

pub async fn lookup(state: &Arc<AppState>, room_code: &str) -> Option<RoomHandle> {
    let mut rooms = state.rooms.lock().await;
    match rooms.get(room_code) {
        Some(handle) if handle.is_alive() => Some(handle.clone()),
        Some(_) => {
            rooms.remove(room_code);
            None
        }
        None => None,
    }
}

/// Periodically drops handles whose room task has already exited --
/// generalizes the teacher's `cleanup_dead_rooms` watchdog in `main.rs`.
pub async fn cleanup_dead_rooms(state: &Arc<AppState>) {
    let mut rooms = state.rooms.lock().await;
    rooms.retain(|code, handle| {
        let alive = handle.is_alive();
        if !alive {
            tracing::info!(room = code, "reaping dead room handle");
        }
        alive
    });
}
