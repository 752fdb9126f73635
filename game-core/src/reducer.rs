//! The tick reducer: `(state, actions) -> (state', events)`.
//!
//! Pure, deterministic, no I/O. Every public entry point is a free function
//! taking `&mut GameState` plus an `events` out-parameter, called in the
//! fixed order spec.md §4.3 lays out. `reduce` is the only function callers
//! outside this module need.

use crate::action::{MoveDirection, PlayerAction};
use crate::entity::{Entity, EntityKind};
use crate::event::{GameEvent, GameResult, ScoreSource};
use crate::layout::*;
use crate::state::{GameMode, GameState, GameStatus};

/// Runs exactly one tick of the simulation.
pub fn reduce(state: &GameState, actions: &[PlayerAction]) -> (GameState, Vec<GameEvent>) {
    let mut state = state.clone();
    let mut events = Vec::new();

    state.tick += 1;

    advance_wipe_phase(&mut state, &mut events);

    if state.status != GameStatus::Playing {
        return (state, events);
    }

    apply_player_actions(&mut state, actions, &mut events);
    move_players(&mut state);
    move_bullets(&mut state);
    move_aliens(&mut state, &mut events);

    if state.status == GameStatus::GameOver {
        return (state, events);
    }

    alien_shoot(&mut state);
    ufo_tick(&mut state, &mut events);
    resolve_collisions(&mut state, &mut events);
    respawn_players(&mut state, &mut events);
    check_wave_complete(&mut state, &mut events);
    check_game_over(&mut state, &mut events);

    (state, events)
}

fn scaled_config(state: &GameState) -> crate::layout::ScaledConfig {
    crate::layout::ScaledConfig::for_player_count(state.players.len())
}

/// Step 2: phase counter for any `wipe_*` / countdown-adjacent status.
fn advance_wipe_phase(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let Some(remaining) = state.wipe_ticks_remaining else {
        return;
    };
    if remaining == 0 {
        transition_wipe_phase(state, events);
        return;
    }
    state.wipe_ticks_remaining = Some(remaining - 1);
    if remaining - 1 == 0 {
        transition_wipe_phase(state, events);
    }
}

fn transition_wipe_phase(state: &mut GameState, events: &mut Vec<GameEvent>) {
    match state.status {
        GameStatus::WipeExit => {
            state.status = GameStatus::WipeHold;
            state.wipe_ticks_remaining = Some(HOLD_TICKS);
        }
        GameStatus::WipeHold => {
            state.status = GameStatus::WipeReveal;
            state.wipe_ticks_remaining = Some(REVEAL_TICKS);
            spawn_wave(state);
        }
        GameStatus::WipeReveal => {
            state.status = GameStatus::Playing;
            state.wipe_ticks_remaining = None;
            state.wipe_wave_number = None;
            for entity in state.entities.iter_mut() {
                if let EntityKind::Alien { entering, .. } = &mut entity.kind {
                    *entering = false;
                }
            }
        }
        _ => {}
    }
}

fn spawn_wave(state: &mut GameState) {
    state.entities.retain(|e| !e.is_alien() && !e.is_bullet());
    let cfg = scaled_config(state);
    let mut formation = build_formation(cfg.alien_cols, cfg.alien_rows);
    for alien in formation.iter_mut() {
        alien.id = state.alloc_entity_id();
    }
    state.entities.extend(formation);
    state.alien_direction = 1;
    state.alien_shooting_disabled = false;

    // Barriers are created once, at the very first wave, and otherwise
    // persist across wave transitions with whatever damage they've taken.
    if !state.entities.iter().any(Entity::is_barrier) {
        let mut barriers = build_barriers(BARRIER_COUNT);
        for barrier in barriers.iter_mut() {
            barrier.id = state.alloc_entity_id();
        }
        state.entities.extend(barriers);
    }
}

/// Step 4: apply queued player actions in receive order.
fn apply_player_actions(state: &mut GameState, actions: &[PlayerAction], events: &mut Vec<GameEvent>) {
    for action in actions {
        match action {
            PlayerAction::Input { player_id, left, right } => {
                if let Some(player) = state.players.get_mut(player_id) {
                    player.input_state.left = *left;
                    player.input_state.right = *right;
                }
            }
            PlayerAction::Move { player_id, direction } => {
                if let Some(player) = state.players.get_mut(player_id) {
                    if !player.alive {
                        continue;
                    }
                    let delta = match direction {
                        MoveDirection::Left => -PLAYER_MOVE_SPEED,
                        MoveDirection::Right => PLAYER_MOVE_SPEED,
                    };
                    player.x = (player.x + delta).clamp(PLAYER_MIN_X, PLAYER_MAX_X);
                }
            }
            PlayerAction::Shoot { player_id } => {
                try_player_shoot(state, player_id);
            }
            PlayerAction::Forfeit { player_id } => {
                let _ = player_id;
                state.status = GameStatus::GameOver;
                events.push(GameEvent::GameOver { result: GameResult::Defeat });
            }
        }
    }
}

fn try_player_shoot(state: &mut GameState, player_id: &str) {
    let tick = state.tick;
    let Some(player) = state.players.get_mut(player_id) else {
        return;
    };
    if !player.alive {
        return;
    }
    if tick.saturating_sub(player.last_shot_tick) < PLAYER_SHOT_COOLDOWN_TICKS
        && player.last_shot_tick != 0
    {
        return;
    }
    player.last_shot_tick = tick;
    let bullet = Entity::new_player_bullet(player_id.to_string(), player.x, PLAYER_Y - 1);
    push_entity(state, bullet);
}

fn push_entity(state: &mut GameState, mut entity: Entity) {
    entity.id = state.alloc_entity_id();
    state.entities.push(entity);
}

/// Step 5: move every alive player by held input, left-then-right so both
/// held nets zero -- this is specified behavior, not a bug (spec.md §9).
fn move_players(state: &mut GameState) {
    for player in state.players.values_mut() {
        if !player.alive {
            continue;
        }
        if player.input_state.left {
            player.x = (player.x - PLAYER_MOVE_SPEED).clamp(PLAYER_MIN_X, PLAYER_MAX_X);
        }
        if player.input_state.right {
            player.x = (player.x + PLAYER_MOVE_SPEED).clamp(PLAYER_MIN_X, PLAYER_MAX_X);
        }
    }
}

/// Step 6: advance bullets, dropping any that left the play area.
fn move_bullets(state: &mut GameState) {
    for entity in state.entities.iter_mut() {
        if let EntityKind::Bullet { dy, .. } = entity.kind {
            entity.y += dy * BASE_BULLET_SPEED;
        }
    }
    state
        .entities
        .retain(|e| !e.is_bullet() || (e.y >= 0 && e.y < GRID_HEIGHT));
}

/// Step 7: move aliens as a whole on the scaled interval, flip/descend at
/// the edges, and check for invasion.
fn move_aliens(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let cfg = scaled_config(state);
    if cfg.move_interval_ticks == 0 || state.tick % cfg.move_interval_ticks as u64 != 0 {
        return;
    }

    let will_flip = state.entities.iter().any(|e| {
        if let EntityKind::Alien { alive, .. } = e.kind {
            alive
                && ((state.alien_direction > 0 && e.x + ALIEN_COL_SPACING > ALIEN_MAX_X)
                    || (state.alien_direction < 0 && e.x - ALIEN_COL_SPACING < ALIEN_MIN_X))
        } else {
            false
        }
    });

    if will_flip {
        state.alien_direction = -state.alien_direction;
        for entity in state.entities.iter_mut() {
            if let EntityKind::Alien { alive, .. } = entity.kind {
                if alive {
                    entity.y += ALIEN_ROW_SPACING;
                }
            }
        }
    } else {
        let dx = state.alien_direction * ALIEN_COL_SPACING / 4;
        let dx = if dx == 0 { state.alien_direction } else { dx };
        for entity in state.entities.iter_mut() {
            if let EntityKind::Alien { alive, .. } = entity.kind {
                if alive {
                    entity.x += dx;
                }
            }
        }
    }

    let invaded = state.entities.iter().any(|e| {
        matches!(e.kind, EntityKind::Alien { alive: true, .. }) && e.y >= GAME_OVER_Y
    });
    if invaded {
        events.push(GameEvent::Invasion);
        state.status = GameStatus::GameOver;
        events.push(GameEvent::GameOver { result: GameResult::Defeat });
    }
}

/// Step 8: each column's frontmost live, non-entering alien may fire.
fn alien_shoot(state: &mut GameState) {
    if state.alien_shooting_disabled {
        return;
    }
    let cfg = scaled_config(state);

    let mut shooters: Vec<(i32, i32)> = Vec::new();
    let mut seen_cols = std::collections::BTreeSet::new();
    for entity in state.entities.iter() {
        if let EntityKind::Alien { col, alive, entering, .. } = entity.kind {
            if !alive || entering || seen_cols.contains(&col) {
                continue;
            }
            let frontmost = state.entities.iter().filter(|e| {
                matches!(e.kind, EntityKind::Alien { col: c, alive: true, entering: false, .. } if c == col)
            }).max_by_key(|e| e.y);
            if let Some(frontmost) = frontmost {
                shooters.push((frontmost.x, frontmost.y));
            }
            seen_cols.insert(col);
        }
    }

    for (x, y) in shooters {
        if state.rng.next_f64() < cfg.alien_shoot_rate {
            let bullet = Entity::new_alien_bullet(x, y + 1);
            push_entity(state, bullet);
        }
    }
}

/// Step 9: spawn/advance the UFO.
fn ufo_tick(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let has_ufo = state.entities.iter().any(Entity::is_ufo);
    if !has_ufo {
        if state.rng.next_f64() < UFO_SPAWN_CHANCE {
            let from_left = state.rng.next_f64() < 0.5;
            let (x, direction) = if from_left {
                (ALIEN_MIN_X, 1)
            } else {
                (ALIEN_MAX_X, -1)
            };
            let points = state.rng.choose(&UFO_SCORE_FAMILY);
            let ufo = Entity::new_ufo(x, ALIEN_START_Y - 2, direction, points);
            events.push(GameEvent::UfoSpawn { x });
            push_entity(state, ufo);
        }
        return;
    }

    for entity in state.entities.iter_mut() {
        if let EntityKind::Ufo { direction, .. } = entity.kind {
            entity.x += direction * UFO_SPEED;
        }
    }
    state
        .entities
        .retain(|e| !e.is_ufo() || (e.x >= 0 && e.x < GRID_WIDTH));
}

fn aabb_hit(ax: i32, ay: i32, bx: i32, by: i32) -> bool {
    (ax - bx).abs() < COLLISION_H && (ay - by).abs() <= COLLISION_V
}

/// Step 10: resolve collisions in the specified order. Each bullet is
/// consumed on its first hit, so it can never score twice.
fn resolve_collisions(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let mut consumed_bullets: std::collections::HashSet<String> = std::collections::HashSet::new();

    check_alien_hits(state, &mut consumed_bullets, events);
    check_ufo_hits(state, &mut consumed_bullets, events);
    check_player_hits(state, &mut consumed_bullets, events);
    check_barrier_hits(state, &mut consumed_bullets);

    state.entities.retain(|e| !e.is_bullet() || !consumed_bullets.contains(&e.id));
}

fn check_alien_hits(
    state: &mut GameState,
    consumed: &mut std::collections::HashSet<String>,
    events: &mut Vec<GameEvent>,
) {
    let bullets: Vec<(String, i32, i32, Option<String>)> = state
        .entities
        .iter()
        .filter(|e| e.is_player_bullet() && !consumed.contains(&e.id))
        .map(|e| {
            let owner = match &e.kind {
                EntityKind::Bullet { owner_id, .. } => owner_id.clone(),
                _ => None,
            };
            (e.id.clone(), e.x, e.y, owner)
        })
        .collect();

    for (bullet_id, bx, by, owner) in bullets {
        if consumed.contains(&bullet_id) {
            continue;
        }
        let hit = state.entities.iter_mut().find(|e| {
            if let EntityKind::Alien { alive, entering, .. } = e.kind {
                alive && !entering && aabb_hit(bx, by, e.x, e.y)
            } else {
                false
            }
        });
        if let Some(alien) = hit {
            let (alien_id, points) = {
                let points = match &mut alien.kind {
                    EntityKind::Alien { alive, points, .. } => {
                        *alive = false;
                        *points
                    }
                    _ => unreachable!(),
                };
                (alien.id.clone(), points)
            };
            consumed.insert(bullet_id);
            events.push(GameEvent::AlienKilled {
                alien_id,
                player_id: owner.clone(),
            });
            events.push(GameEvent::ScoreAwarded {
                player_id: owner.clone(),
                points,
                source: ScoreSource::Alien,
            });
            state.score += points;
            if let Some(owner_id) = owner.as_ref() {
                if let Some(player) = state.players.get_mut(owner_id) {
                    player.kills += 1;
                }
            }
        }
    }
}

fn check_ufo_hits(
    state: &mut GameState,
    consumed: &mut std::collections::HashSet<String>,
    events: &mut Vec<GameEvent>,
) {
    let bullets: Vec<(String, i32, i32, Option<String>)> = state
        .entities
        .iter()
        .filter(|e| e.is_player_bullet() && !consumed.contains(&e.id))
        .map(|e| {
            let owner = match &e.kind {
                EntityKind::Bullet { owner_id, .. } => owner_id.clone(),
                _ => None,
            };
            (e.id.clone(), e.x, e.y, owner)
        })
        .collect();

    for (bullet_id, bx, by, owner) in bullets {
        if consumed.contains(&bullet_id) {
            continue;
        }
        let hit_points = state.entities.iter_mut().find_map(|e| {
            if let EntityKind::Ufo { alive, points, .. } = &mut e.kind {
                if *alive && aabb_hit(bx, by, e.x, e.y) {
                    *alive = false;
                    return Some(*points);
                }
            }
            None
        });
        if let Some(points) = hit_points {
            consumed.insert(bullet_id);
            events.push(GameEvent::ScoreAwarded {
                player_id: owner.clone(),
                points,
                source: ScoreSource::Ufo,
            });
            state.score += points;
            if let Some(owner_id) = owner.as_ref() {
                if let Some(player) = state.players.get_mut(owner_id) {
                    player.kills += 1;
                }
            }
        }
    }
    state.entities.retain(|e| !matches!(e.kind, EntityKind::Ufo { alive: false, .. }));
}

fn check_player_hits(
    state: &mut GameState,
    consumed: &mut std::collections::HashSet<String>,
    events: &mut Vec<GameEvent>,
) {
    let bullets: Vec<(String, i32, i32)> = state
        .entities
        .iter()
        .filter(|e| e.is_alien_bullet() && !consumed.contains(&e.id))
        .map(|e| (e.id.clone(), e.x, e.y))
        .collect();

    for (bullet_id, bx, by) in bullets {
        if consumed.contains(&bullet_id) {
            continue;
        }
        let hit_player = state
            .players
            .values_mut()
            .find(|p| p.alive && aabb_hit(bx, by, p.x, PLAYER_Y));
        if let Some(player) = hit_player {
            player.alive = false;
            player.respawn_at_tick = Some(state.tick + RESPAWN_DELAY_TICKS);
            consumed.insert(bullet_id);
            state.lives = state.lives.saturating_sub(1);
            events.push(GameEvent::PlayerDied { player_id: player.id.clone() });
        }
    }
}

fn check_barrier_hits(state: &mut GameState, consumed: &mut std::collections::HashSet<String>) {
    let bullets: Vec<(String, i32, i32)> = state
        .entities
        .iter()
        .filter(|e| e.is_bullet() && !consumed.contains(&e.id))
        .map(|e| (e.id.clone(), e.x, e.y))
        .collect();

    for (bullet_id, bx, by) in bullets {
        if consumed.contains(&bullet_id) {
            continue;
        }
        for entity in state.entities.iter_mut() {
            let EntityKind::Barrier { segments } = &mut entity.kind else {
                continue;
            };
            let hit = segments.iter_mut().find(|segment| {
                segment.health > 0
                    && bx == entity.x + segment.offset_x
                    && by == entity.y + segment.offset_y
            });
            if let Some(segment) = hit {
                segment.health = segment.health.saturating_sub(1);
                consumed.insert(bullet_id.clone());
                break;
            }
        }
    }
}

/// Step 11: respawn any dead player whose delay elapsed and who has lives.
fn respawn_players(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let tick = state.tick;
    let lives_left = state.lives;
    let mut to_respawn = Vec::new();
    for player in state.players.values() {
        if !player.alive {
            if let Some(at) = player.respawn_at_tick {
                if at <= tick && lives_left > 0 {
                    to_respawn.push(player.id.clone());
                }
            }
        }
    }
    for id in to_respawn {
        if let Some(player) = state.players.get_mut(&id) {
            player.alive = true;
            player.respawn_at_tick = None;
            player.recenter();
            events.push(GameEvent::PlayerRespawned { player_id: id });
        }
    }
}

/// Step 12: start a wave transition once no live (non-entering) aliens
/// remain. Barriers are preserved with their current damage.
fn check_wave_complete(state: &mut GameState, events: &mut Vec<GameEvent>) {
    let any_alive = state
        .entities
        .iter()
        .any(|e| matches!(e.kind, EntityKind::Alien { alive: true, .. }));
    if any_alive {
        return;
    }
    state.wave += 1;
    events.push(GameEvent::WaveComplete { wave: state.wave });
    state.status = GameStatus::WipeExit;
    state.wipe_ticks_remaining = Some(EXIT_TICKS);
    state.wipe_wave_number = Some(state.wave);
}

/// Step 13: shared lives exhausted, or the sole solo player is dead.
fn check_game_over(state: &mut GameState, events: &mut Vec<GameEvent>) {
    if state.status == GameStatus::GameOver {
        return;
    }
    let out_of_lives = state.lives == 0
        && state.players.values().any(|p| !p.alive)
        && (state.mode == GameMode::Coop || state.players.len() <= 1);
    if out_of_lives {
        state.status = GameStatus::GameOver;
        events.push(GameEvent::GameOver { result: GameResult::Defeat });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AlienType, BarrierSegment};
    use crate::player::Player;

    fn playing_state() -> GameState {
        let mut state = GameState::new("TEST01".to_string(), GameMode::Coop, 7);
        state.status = GameStatus::Playing;
        state.refresh_config();
        state.lives = state.config.lives;
        state
    }

    /// A single alive, non-entering alien parked out of the way so
    /// `check_wave_complete` doesn't read an intentionally empty formation
    /// as "wave cleared" in tests that aren't exercising that transition.
    fn push_filler_alien(state: &mut GameState) {
        let mut alien = Entity::new_alien(0, 0, AlienType::Squid);
        alien.id = "e_filler".to_string();
        alien.x = ALIEN_MIN_X;
        alien.y = ALIEN_START_Y;
        if let EntityKind::Alien { entering, .. } = &mut alien.kind {
            *entering = false;
        }
        state.entities.push(alien);
    }

    #[test]
    fn both_keys_held_nets_zero_movement() {
        let mut state = playing_state();
        push_filler_alien(&mut state);
        let mut player = Player::new("p1".to_string(), "Alice".to_string(), 1);
        player.input_state.left = true;
        player.input_state.right = true;
        let starting_x = player.x;
        state.players.insert("p1".to_string(), player);

        let (next, _events) = reduce(&state, &[]);
        assert_eq!(next.players["p1"].x, starting_x);
    }

    #[test]
    fn alien_flip_at_boundary_descends_whole_formation() {
        let mut state = playing_state();
        state.alien_direction = 1;
        state.tick = 17; // scaled move interval for 0 players is 18 ticks
        let mut alien = Entity::new_alien(0, 0, AlienType::Squid);
        alien.id = "e_0".to_string();
        alien.x = ALIEN_MAX_X - 1;
        alien.y = ALIEN_START_Y;
        if let EntityKind::Alien { entering, .. } = &mut alien.kind {
            *entering = false;
        }
        let starting_y = alien.y;
        state.entities.push(alien);

        let (next, _events) = reduce(&state, &[]);
        assert_eq!(next.alien_direction, -1);
        let moved = next
            .entities
            .iter()
            .find(|e| e.id == "e_0")
            .expect("alien still present");
        assert_eq!(moved.y, starting_y + ALIEN_ROW_SPACING);
    }

    #[test]
    fn bullet_hits_player_one_cell_inside_collision_box() {
        let mut state = playing_state();
        let mut player = Player::new("p1".to_string(), "Alice".to_string(), 1);
        player.x = 50;
        player.alive = true;
        state.players.insert("p1".to_string(), player);

        let mut bullet = Entity::new_alien_bullet(51, PLAYER_Y - 1);
        bullet.id = "e_0".to_string();
        state.entities.push(bullet);

        let (next, events) = reduce(&state, &[]);
        assert!(!next.players["p1"].alive);
        assert!(events.iter().any(|e| matches!(e, GameEvent::PlayerDied { .. })));
    }

    #[test]
    fn bullet_misses_player_exactly_at_collision_box_edge() {
        let mut state = playing_state();
        let mut player = Player::new("p1".to_string(), "Alice".to_string(), 1);
        player.x = 50;
        player.alive = true;
        state.players.insert("p1".to_string(), player);

        let mut bullet = Entity::new_alien_bullet(52, PLAYER_Y - 1);
        bullet.id = "e_0".to_string();
        state.entities.push(bullet);

        let (next, _events) = reduce(&state, &[]);
        assert!(next.players["p1"].alive);
    }

    #[test]
    fn wipe_cycle_between_waves_takes_exactly_120_non_gameplay_ticks() {
        let mut state = playing_state();
        state.status = GameStatus::WipeExit;
        state.wipe_ticks_remaining = Some(EXIT_TICKS);

        let mut ticks = 0;
        while state.status != GameStatus::Playing {
            let (next, _events) = reduce(&state, &[]);
            state = next;
            ticks += 1;
            assert!(ticks <= 150, "wipe cycle never reached Playing");
        }
        assert_eq!(ticks, (EXIT_TICKS + HOLD_TICKS + REVEAL_TICKS) as i32);
    }

    #[test]
    fn wave_transition_preserves_barrier_damage_and_rebuilds_aliens() {
        let mut state = playing_state();
        let mut barrier = Entity::new_barrier(40, BARRIER_Y, 1, 1);
        barrier.id = "e_0".to_string();
        if let EntityKind::Barrier { segments } = &mut barrier.kind {
            segments[0] = BarrierSegment { offset_x: 0, offset_y: 0, health: 2 };
        }
        state.entities.push(barrier);
        // No live aliens: the next tick must declare the wave complete.

        let mut ticks = 0;
        while state.status != GameStatus::Playing {
            let (next, _events) = reduce(&state, &[]);
            state = next;
            ticks += 1;
            assert!(ticks <= 200, "wave never completed its wipe cycle");
        }

        let barrier = state
            .entities
            .iter()
            .find(|e| e.is_barrier())
            .expect("barrier preserved across the wave transition");
        match &barrier.kind {
            EntityKind::Barrier { segments } => assert_eq!(segments[0].health, 2),
            _ => unreachable!(),
        }
        assert_eq!(state.wave, 2);
        assert!(state.entities.iter().any(Entity::is_alien));
    }

    #[test]
    fn entity_ids_are_monotonic_and_never_reused() {
        let mut state = playing_state();
        push_filler_alien(&mut state);
        let mut player = Player::new("p1".to_string(), "Alice".to_string(), 1);
        player.x = 50;
        state.players.insert("p1".to_string(), player);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..15 {
            let (next, _events) = reduce(&state, &[PlayerAction::Shoot { player_id: "p1".to_string() }]);
            state = next;
            for entity in &state.entities {
                seen.insert(entity.id.clone());
            }
            // cooldown means not every tick spawns a bullet, but whichever
            // ids do appear must never repeat across ticks.
        }
        assert!(seen.len() >= 2, "expected the cooldown to allow at least two shots");
        let ids: Vec<u64> = seen
            .iter()
            .filter_map(|id| id.strip_prefix("e_").and_then(|n| n.parse::<u64>().ok()))
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids.len(), sorted.len());
    }
}
