//! Mutation handlers, one per gameplay event.
//!
//! Each handler applies a single event to a session's [`GameState`] and
//! returns the events to broadcast to the session, in emit order. An empty
//! vector means nothing changed (the referenced enemy or tower was not found).

use log::{debug, info};
use shared::{
    Enemy, EnemyId, GameState, ServerEvent, Tower, TowerId, KILL_REWARD, KILL_SCORE,
    MIN_FIRE_RATE, UPGRADE_DAMAGE_FACTOR, UPGRADE_FIRE_RATE_FACTOR,
};

pub fn spawn_enemy(state: &mut GameState, enemy: Enemy) -> Vec<ServerEvent> {
    debug!("Spawning enemy {} in lane {}", enemy.id, enemy.lane_index);
    state.enemies.push(enemy.clone());
    vec![ServerEvent::EnemySpawned(enemy)]
}

/// Applies a client-computed health value to an enemy.
///
/// The server trusts `health` as sent; `damage` is only logged. When health
/// drops to zero or below, every enemy carrying that id is removed and the
/// kill reward is paid out.
pub fn damage_enemy(
    state: &mut GameState,
    enemy_id: EnemyId,
    damage: f32,
    health: f32,
) -> Vec<ServerEvent> {
    let Some(enemy) = state.find_enemy_mut(enemy_id) else {
        debug!("Damage for unknown enemy {}", enemy_id);
        return Vec::new();
    };

    debug!("Enemy {} took {} damage, health now {}", enemy_id, damage, health);
    enemy.health = health;

    let mut events = vec![ServerEvent::EnemyHealthUpdate { enemy_id, health }];

    if health <= 0.0 {
        state.enemies.retain(|enemy| enemy.id != enemy_id);
        state.score = state.score.saturating_add(KILL_SCORE);
        state.money = state.money.saturating_add(KILL_REWARD);
        info!(
            "Enemy {} destroyed (score {}, money {})",
            enemy_id, state.score, state.money
        );

        events.push(ServerEvent::EnemyDestroyed(enemy_id));
        events.push(ServerEvent::GameState(state.clone()));
    }

    events
}

/// Adds a tower and charges its cost. Money is allowed to go negative but
/// saturates at the `i32` bounds.
pub fn place_tower(state: &mut GameState, tower: Tower) -> Vec<ServerEvent> {
    state.money = state.money.saturating_sub(tower.cost);
    debug!(
        "Placed tower {} for {} (money left {})",
        tower.id, tower.cost, state.money
    );
    state.towers.push(tower);
    vec![ServerEvent::GameState(state.clone())]
}

pub fn move_tower(
    state: &mut GameState,
    tower_id: TowerId,
    x: f32,
    y: f32,
    lane_index: u32,
) -> Vec<ServerEvent> {
    let Some(tower) = state.find_tower_mut(tower_id) else {
        debug!("Move for unknown tower {}", tower_id);
        return Vec::new();
    };

    tower.x = x;
    tower.y = y;
    tower.lane_index = lane_index;

    vec![ServerEvent::TowerMoved {
        tower_id,
        x,
        y,
        lane_index,
    }]
}

/// Levels a tower up. Damage grows by half (rounded down) and the fire
/// interval shrinks by a fifth, never below [`MIN_FIRE_RATE`].
pub fn upgrade_tower(state: &mut GameState, tower_id: TowerId) -> Vec<ServerEvent> {
    let Some(tower) = state.find_tower_mut(tower_id) else {
        debug!("Upgrade for unknown tower {}", tower_id);
        return Vec::new();
    };

    tower.level = tower.level.saturating_add(1);
    tower.damage = (tower.damage * UPGRADE_DAMAGE_FACTOR).floor();
    tower.fire_rate = (tower.fire_rate * UPGRADE_FIRE_RATE_FACTOR).max(MIN_FIRE_RATE);

    debug!(
        "Tower {} upgraded to level {} (damage {}, fire rate {})",
        tower_id, tower.level, tower.damage, tower.fire_rate
    );

    vec![ServerEvent::TowerUpgraded {
        tower_id,
        level: tower.level,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn tower(id: TowerId, cost: i32, damage: f32, fire_rate: f32) -> Tower {
        Tower {
            damage,
            fire_rate,
            ..Tower::new(id, 0, cost)
        }
    }

    #[test]
    fn test_spawn_appends_in_order() {
        let mut state = GameState::default();
        spawn_enemy(&mut state, Enemy::new(2, 0, 20.0));
        let events = spawn_enemy(&mut state, Enemy::new(1, 1, 30.0));

        let ids: Vec<EnemyId> = state.enemies.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(events, vec![ServerEvent::EnemySpawned(Enemy::new(1, 1, 30.0))]);
    }

    #[test]
    fn test_spawn_accepts_duplicate_ids() {
        let mut state = GameState::default();
        spawn_enemy(&mut state, Enemy::new(5, 0, 20.0));
        spawn_enemy(&mut state, Enemy::new(5, 1, 20.0));
        assert_eq!(state.enemies.len(), 2);
    }

    #[test]
    fn test_damage_sets_supplied_health() {
        let mut state = GameState::default();
        spawn_enemy(&mut state, Enemy::new(1, 0, 20.0));

        // Server trusts the client's health, not health - damage
        let events = damage_enemy(&mut state, 1, 3.0, 12.0);

        assert_approx_eq!(state.enemies[0].health, 12.0, 1e-6);
        assert_eq!(
            events,
            vec![ServerEvent::EnemyHealthUpdate {
                enemy_id: 1,
                health: 12.0
            }]
        );
        assert_eq!(state.score, 0);
        assert_eq!(state.money, 100);
    }

    #[test]
    fn test_lethal_damage_destroys_and_rewards() {
        let mut state = GameState::default();
        spawn_enemy(&mut state, Enemy::new(1, 0, 20.0));

        let events = damage_enemy(&mut state, 1, 20.0, 0.0);

        assert!(state.enemies.is_empty());
        assert_eq!(state.score, 10);
        assert_eq!(state.money, 115);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ServerEvent::EnemyHealthUpdate {
                enemy_id: 1,
                health: 0.0
            }
        );
        assert_eq!(events[1], ServerEvent::EnemyDestroyed(1));
        assert_eq!(events[2], ServerEvent::GameState(state.clone()));
    }

    #[test]
    fn test_lethal_damage_removes_all_duplicates() {
        let mut state = GameState::default();
        spawn_enemy(&mut state, Enemy::new(1, 0, 20.0));
        spawn_enemy(&mut state, Enemy::new(2, 0, 20.0));
        spawn_enemy(&mut state, Enemy::new(1, 1, 20.0));

        damage_enemy(&mut state, 1, 25.0, -5.0);

        let ids: Vec<EnemyId> = state.enemies.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(state.score, 10);
    }

    #[test]
    fn test_destroyed_enemy_is_not_destroyed_twice() {
        let mut state = GameState::default();
        spawn_enemy(&mut state, Enemy::new(1, 0, 20.0));

        damage_enemy(&mut state, 1, 20.0, 0.0);
        let events = damage_enemy(&mut state, 1, 20.0, 0.0);

        assert!(events.is_empty());
        assert_eq!(state.score, 10);
        assert_eq!(state.money, 115);
    }

    #[test]
    fn test_damage_unknown_enemy_is_noop() {
        let mut state = GameState::default();
        let before = state.clone();
        assert!(damage_enemy(&mut state, 42, 10.0, 0.0).is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_place_tower_charges_cost() {
        let mut state = GameState::default();
        let events = place_tower(&mut state, Tower::new(1, 0, 50));

        assert_eq!(state.money, 50);
        assert_eq!(state.towers.len(), 1);
        assert_eq!(events, vec![ServerEvent::GameState(state.clone())]);
    }

    #[test]
    fn test_place_tower_lets_money_go_negative() {
        let mut state = GameState::default();
        place_tower(&mut state, Tower::new(1, 0, 80));
        place_tower(&mut state, Tower::new(2, 0, 80));
        assert_eq!(state.money, -60);
    }

    #[test]
    fn test_extreme_costs_saturate() {
        let mut state = GameState::default();
        place_tower(&mut state, Tower::new(1, 0, i32::MIN));
        assert_eq!(state.money, i32::MAX);

        let mut state = GameState::default();
        place_tower(&mut state, Tower::new(1, 0, i32::MAX));
        place_tower(&mut state, Tower::new(2, 0, i32::MAX));
        assert_eq!(state.money, i32::MIN);
        assert_eq!(state.towers.len(), 2);
    }

    #[test]
    fn test_kill_reward_saturates() {
        let mut state = GameState::default();
        state.money = i32::MAX - 1;
        state.score = i32::MAX;
        spawn_enemy(&mut state, Enemy::new(1, 0, 20.0));

        damage_enemy(&mut state, 1, 20.0, 0.0);

        assert_eq!(state.money, i32::MAX);
        assert_eq!(state.score, i32::MAX);
    }

    #[test]
    fn test_upgrade_at_max_level_saturates() {
        let mut state = GameState::default();
        place_tower(
            &mut state,
            Tower {
                level: u32::MAX,
                ..Tower::new(1, 0, 10)
            },
        );

        let events = upgrade_tower(&mut state, 1);

        assert_eq!(
            events,
            vec![ServerEvent::TowerUpgraded {
                tower_id: 1,
                level: u32::MAX
            }]
        );
    }

    #[test]
    fn test_move_tower_overwrites_position_and_lane() {
        let mut state = GameState::default();
        place_tower(&mut state, Tower::new(1, 0, 50));

        let events = move_tower(&mut state, 1, 40.0, 80.0, 2);

        let tower = &state.towers[0];
        assert_approx_eq!(tower.x, 40.0, 1e-6);
        assert_approx_eq!(tower.y, 80.0, 1e-6);
        assert_eq!(tower.lane_index, 2);
        assert_eq!(
            events,
            vec![ServerEvent::TowerMoved {
                tower_id: 1,
                x: 40.0,
                y: 80.0,
                lane_index: 2
            }]
        );
    }

    #[test]
    fn test_move_unknown_tower_is_noop() {
        let mut state = GameState::default();
        assert!(move_tower(&mut state, 9, 1.0, 1.0, 1).is_empty());
    }

    #[test]
    fn test_upgrade_twice() {
        let mut state = GameState::default();
        place_tower(&mut state, tower(1, 50, 10.0, 1000.0));

        upgrade_tower(&mut state, 1);
        let events = upgrade_tower(&mut state, 1);

        let tower = &state.towers[0];
        assert_eq!(tower.level, 3);
        assert_approx_eq!(tower.damage, 22.0, 1e-6);
        assert_approx_eq!(tower.fire_rate, 640.0, 1e-3);
        assert_eq!(
            events,
            vec![ServerEvent::TowerUpgraded {
                tower_id: 1,
                level: 3
            }]
        );
    }

    #[test]
    fn test_upgrade_is_monotonic_with_fire_rate_floor() {
        let mut state = GameState::default();
        place_tower(&mut state, tower(1, 50, 10.0, 1000.0));

        let mut last_damage = state.towers[0].damage;
        let mut last_fire_rate = state.towers[0].fire_rate;

        for _ in 0..10 {
            upgrade_tower(&mut state, 1);
            let tower = &state.towers[0];
            assert!(tower.damage > last_damage);
            assert!(tower.fire_rate >= MIN_FIRE_RATE);
            if last_fire_rate > MIN_FIRE_RATE {
                assert!(tower.fire_rate < last_fire_rate);
            }
            last_damage = tower.damage;
            last_fire_rate = tower.fire_rate;
        }

        assert_approx_eq!(last_fire_rate, MIN_FIRE_RATE, 1e-6);
    }

    #[test]
    fn test_upgrade_unknown_tower_is_noop() {
        let mut state = GameState::default();
        assert!(upgrade_tower(&mut state, 3).is_empty());
    }

    #[test]
    fn test_money_and_score_follow_event_deltas() {
        let mut state = GameState::default();

        place_tower(&mut state, Tower::new(1, 0, 30));
        spawn_enemy(&mut state, Enemy::new(1, 0, 20.0));
        spawn_enemy(&mut state, Enemy::new(2, 0, 20.0));
        damage_enemy(&mut state, 1, 20.0, 0.0);
        place_tower(&mut state, Tower::new(2, 0, 45));
        damage_enemy(&mut state, 2, 5.0, 15.0);
        damage_enemy(&mut state, 2, 15.0, 0.0);

        assert_eq!(state.money, 100 - 30 + 15 - 45 + 15);
        assert_eq!(state.score, 20);
    }
}
