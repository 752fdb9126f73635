//! The tagged-union entity model: aliens, bullets, barriers, the UFO.
//!
//! Collision and movement routines pattern-match on `Entity::kind` rather
//! than dispatching through a trait object -- there are exactly four kinds
//! and they never grow a fifth at runtime, so a closed `enum` is the
//! idiomatic fit.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlienType {
    Squid,
    Crab,
    Octopus,
}

impl AlienType {
    pub fn points(self) -> u32 {
        match self {
            AlienType::Squid => 30,
            AlienType::Crab => 20,
            AlienType::Octopus => 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierSegment {
    pub offset_x: i32,
    pub offset_y: i32,
    pub health: u8,
}

/// A single entity in `GameState.entities`. `id` is the monotonic `"e_N"`
/// string handed out by the room; kind-specific fields live in `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub x: i32,
    pub y: i32,
    #[serde(flatten)]
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKind {
    Alien {
        row: i32,
        col: i32,
        #[serde(rename = "type")]
        alien_type: AlienType,
        alive: bool,
        points: u32,
        entering: bool,
    },
    Bullet {
        /// `None` means alien-owned.
        owner_id: Option<String>,
        dy: i32,
    },
    Barrier {
        segments: Vec<BarrierSegment>,
    },
    Ufo {
        direction: i32,
        alive: bool,
        points: u32,
    },
}

impl Entity {
    pub fn new_alien(row: i32, col: i32, alien_type: AlienType) -> Self {
        Entity {
            id: String::new(),
            x: crate::layout::ALIEN_START_X + col * crate::layout::ALIEN_COL_SPACING,
            y: crate::layout::ALIEN_START_Y + row * crate::layout::ALIEN_ROW_SPACING,
            kind: EntityKind::Alien {
                row,
                col,
                alien_type,
                alive: true,
                points: alien_type.points(),
                entering: true,
            },
        }
    }

    pub fn new_player_bullet(owner_id: String, x: i32, y: i32) -> Self {
        Entity {
            id: String::new(),
            x,
            y,
            kind: EntityKind::Bullet {
                owner_id: Some(owner_id),
                dy: -1,
            },
        }
    }

    pub fn new_alien_bullet(x: i32, y: i32) -> Self {
        Entity {
            id: String::new(),
            x,
            y,
            kind: EntityKind::Bullet {
                owner_id: None,
                dy: 1,
            },
        }
    }

    pub fn new_barrier(x: i32, y: i32, cols: i32, rows: i32) -> Self {
        let mut segments = Vec::with_capacity((cols * rows) as usize);
        for row in 0..rows {
            for col in 0..cols {
                segments.push(BarrierSegment {
                    offset_x: col,
                    offset_y: row,
                    health: crate::layout::BARRIER_MAX_HEALTH,
                });
            }
        }
        Entity {
            id: String::new(),
            x,
            y,
            kind: EntityKind::Barrier { segments },
        }
    }

    pub fn new_ufo(x: i32, y: i32, direction: i32, points: u32) -> Self {
        Entity {
            id: String::new(),
            x,
            y,
            kind: EntityKind::Ufo {
                direction,
                alive: true,
                points,
            },
        }
    }

    pub fn is_alien(&self) -> bool {
        matches!(self.kind, EntityKind::Alien { .. })
    }

    pub fn is_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet { .. })
    }

    pub fn is_ufo(&self) -> bool {
        matches!(self.kind, EntityKind::Ufo { .. })
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self.kind, EntityKind::Barrier { .. })
    }

    /// `true` for a bullet moving upward (player-owned, `dy == -1`).
    pub fn is_player_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet { dy, .. } if dy < 0)
    }

    pub fn is_alien_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet { dy, .. } if dy > 0)
    }
}
