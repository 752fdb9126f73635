//! Room snapshot persistence, keyed by room code.
//!
//! The teacher's relay never persisted anything -- a room lived and died
//! with its in-memory `Room` entry. This server snapshots `GameState` after
//! every broadcast so a room surviving a server restart can resume from
//! `migrate_game_state` rather than from scratch.

use async_trait::async_trait;
use game_core::GameState;

#[derive(Debug)]
pub enum PersistError {
    Backend(String),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Backend(msg) => write!(f, "persistence backend error: {msg}"),
            PersistError::Serialize(err) => write!(f, "serialize error: {err}"),
        }
    }
}

impl std::error::Error for PersistError {}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, room_code: &str, state: &GameState) -> Result<(), PersistError>;
    async fn load(&self, room_code: &str) -> Result<Option<serde_json::Value>, PersistError>;
    async fn remove(&self, room_code: &str) -> Result<(), PersistError>;
}

pub struct SledPersistence {
    db: sled::Db,
}

impl SledPersistence {
    pub fn open(path: &str) -> Result<Self, PersistError> {
        let db = sled::open(path).map_err(|e| PersistError::Backend(e.to_string()))?;
        Ok(SledPersistence { db })
    }
}

#[async_trait]
impl Persistence for SledPersistence {
    async fn save(&self, room_code: &str, state: &GameState) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec(state).map_err(PersistError::Serialize)?;
        self.db
            .insert(room_code.as_bytes(), bytes)
            .map_err(|e| PersistError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, room_code: &str) -> Result<Option<serde_json::Value>, PersistError> {
        let Some(bytes) = self
            .db
            .get(room_code.as_bytes())
            .map_err(|e| PersistError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(PersistError::Serialize)?;
        Ok(Some(value))
    }

    async fn remove(&self, room_code: &str) -> Result<(), PersistError> {
        self.db
            .remove(room_code.as_bytes())
            .map_err(|e| PersistError::Backend(e.to_string()))?;
        Ok(())
    }
}
