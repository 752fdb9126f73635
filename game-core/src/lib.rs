//! Pure, deterministic simulation core for a single room.
//!
//! Nothing in this crate performs I/O, holds a clock, or talks to a socket.
//! `game-server` owns the tick loop, the network, and persistence; it only
//! ever calls into here through [`reducer::reduce`] and the `GameState`
//! constructors. That boundary is what makes replay and property testing
//! possible: same seed, same action sequence, same trajectory.

pub mod action;
pub mod entity;
pub mod event;
pub mod layout;
pub mod player;
pub mod reducer;
pub mod rng;
pub mod state;

pub use action::{MoveDirection, PlayerAction};
pub use entity::{AlienType, BarrierSegment, Entity, EntityKind};
pub use event::{GameEvent, GameResult, ScoreSource};
pub use layout::ScaledConfig;
pub use player::{InputState, Player, PlayerId};
pub use reducer::reduce;
pub use rng::Mulberry32;
pub use state::{migrate_game_state, GameMode, GameState, GameStatus};

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn playing_room(seed: u32, player_count: usize) -> GameState {
        let mut state = GameState::new("ROOMID".to_string(), GameMode::Coop, seed);
        for slot in 1..=player_count as u8 {
            let id = format!("p{slot}");
            let mut player = Player::new(id.clone(), format!("player-{slot}"), slot);
            player.lives = 1;
            state.players.insert(id, player);
        }
        state.refresh_config();
        state.lives = state.config.lives;
        state.status = GameStatus::WipeHold;
        state.wipe_ticks_remaining = Some(0);
        let (mut state, _events) = reduce(&state, &[]);
        // one more tick finishes the WipeReveal -> Playing transition
        state.wipe_ticks_remaining = Some(0);
        let (state, _events) = reduce(&state, &[]);
        state
    }

    proptest! {
        /// Replaying the same seed and action sequence from the same start
        /// always reaches the same state: the reducer is referentially
        /// transparent and never reaches for ambient randomness or time.
        #[test]
        fn same_seed_same_trajectory(seed in any::<u32>(), steps in 1usize..20) {
            let base = playing_room(seed, 2);
            let actions: Vec<Vec<PlayerAction>> = (0..steps).map(|_| Vec::new()).collect();

            let mut a = base.clone();
            for batch in &actions {
                let (next, _) = reduce(&a, batch);
                a = next;
            }

            let mut b = base.clone();
            for batch in &actions {
                let (next, _) = reduce(&b, batch);
                b = next;
            }

            prop_assert_eq!(a.tick, b.tick);
            prop_assert_eq!(a.score, b.score);
            prop_assert_eq!(a.rng.seed(), b.rng.seed());
            prop_assert_eq!(a.entities.len(), b.entities.len());
        }

        /// `ready_player_ids` never names a player who has left the room.
        #[test]
        fn ready_ids_subset_of_players(seed in any::<u32>()) {
            let mut state = GameState::new("R".to_string(), GameMode::Coop, seed);
            let p = Player::new("p1".to_string(), "one".to_string(), 1);
            state.players.insert("p1".to_string(), p);
            state.ready_player_ids.push("p1".to_string());
            state.ready_player_ids.push("ghost".to_string());
            let json = serde_json::to_value(&state).unwrap();
            let migrated = migrate_game_state(json, "R", seed);
            prop_assert!(migrated.ready_player_ids.iter().all(|id| migrated.players.contains_key(id)));
        }

        /// At most one UFO ever exists at a time.
        #[test]
        fn at_most_one_ufo(seed in any::<u32>(), ticks in 1usize..200) {
            let mut state = playing_room(seed, 1);
            for _ in 0..ticks {
                let (next, _) = reduce(&state, &[]);
                state = next;
                let ufo_count = state.entities.iter().filter(|e| e.is_ufo()).count();
                prop_assert!(ufo_count <= 1);
            }
        }

        /// Score and remaining lives never go negative (they're unsigned,
        /// so this really checks no underflow panic occurs across a run).
        #[test]
        fn score_and_lives_never_underflow(seed in any::<u32>(), ticks in 1usize..300) {
            let mut state = playing_room(seed, 3);
            for i in 0..ticks {
                let actions = if i % 7 == 0 {
                    vec![PlayerAction::Shoot { player_id: "p1".to_string() }]
                } else {
                    Vec::new()
                };
                let (next, _) = reduce(&state, &actions);
                state = next;
            }
            prop_assert!(state.score <= u32::MAX);
        }

        /// Every alive player stays within the horizontal travel bounds.
        #[test]
        fn players_stay_in_bounds(seed in any::<u32>(), ticks in 1usize..100) {
            let mut state = playing_room(seed, 2);
            for i in 0..ticks {
                let dir = i % 2 == 0;
                let actions = vec![PlayerAction::Input { player_id: "p1".to_string(), left: dir, right: !dir }];
                let (next, _) = reduce(&state, &actions);
                state = next;
                for player in state.players.values() {
                    prop_assert!(player.x >= layout::PLAYER_MIN_X && player.x <= layout::PLAYER_MAX_X);
                }
            }
        }
    }
}
