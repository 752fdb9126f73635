//! Server-wide tunables loaded from `RoomServer.toml`, hot-reloadable the
//! same way the teacher's `GameConfig.json` was -- a `GET /reload` call
//! re-reads the file into a fresh `ServerConfig` without restarting.

use serde::Deserialize;
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub static_dir: String,
    /// Overrides `game_core::layout::TICK_INTERVAL_MS` when non-zero; lets
    /// an operator slow the simulation down for debugging without a rebuild.
    pub tick_interval_ms_override: u64,
    pub idle_cleanup_secs: u64,
    pub rate_limit_per_second: u32,
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            static_dir: ".".to_string(),
            tick_interval_ms_override: 0,
            idle_cleanup_secs: game_core::layout::ROOM_CLEANUP_SECS,
            rate_limit_per_second: game_core::layout::RATE_LIMIT_PER_SECOND,
            db_path: "rooms.sled".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn tick_interval_ms(&self) -> u64 {
        if self.tick_interval_ms_override > 0 {
            self.tick_interval_ms_override
        } else {
            game_core::layout::TICK_INTERVAL_MS
        }
    }
}

/// Reads `RoomServer.toml` if present; a missing file is not an error, it
/// just means every tunable keeps its default.
pub async fn load_config(path: &str) -> Result<ServerConfig, String> {
    match fs::read_to_string(path).await {
        Ok(content) => toml::from_str(&content).map_err(|e| format!("Failed to parse {path}: {e}")),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(error) => Err(format!("Failed to read {path}: {error}")),
    }
}

pub async fn reload_config(path: &str, shared: &RwLock<ServerConfig>) -> Result<(), String> {
    let fresh = load_config(path).await?;
    let mut guard = shared.write().await;
    *guard = fresh;
    Ok(())
}
