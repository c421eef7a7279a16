use serde::{Deserialize, Serialize};

pub const STARTING_BARRIER_HEALTH: i32 = 100;
pub const STARTING_MONEY: i32 = 100;
pub const DEFAULT_DIFFICULTY_INTERVAL_MS: u32 = 15_000;
pub const DIFFICULTY_STEP: f32 = 0.2;
pub const KILL_SCORE: i32 = 10;
pub const KILL_REWARD: i32 = 15;
pub const UPGRADE_DAMAGE_FACTOR: f32 = 1.5;
pub const UPGRADE_FIRE_RATE_FACTOR: f32 = 0.8;
pub const MIN_FIRE_RATE: f32 = 300.0;

pub type SessionId = String;
pub type EnemyId = u64;
pub type TowerId = u64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Enemy {
    pub id: EnemyId,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub max_health: f32,
    pub speed: f32,
    pub lane_index: u32,
}

impl Enemy {
    pub fn new(id: EnemyId, lane_index: u32, health: f32) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            health,
            max_health: health,
            speed: 1.0,
            lane_index,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tower {
    pub id: TowerId,
    pub x: f32,
    pub y: f32,
    pub level: u32,
    pub damage: f32,
    pub fire_rate: f32,
    pub range: f32,
    pub cost: i32,
    pub lane_index: u32,
}

impl Tower {
    pub fn new(id: TowerId, lane_index: u32, cost: i32) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            level: 1,
            damage: 10.0,
            fire_rate: 1000.0,
            range: 150.0,
            cost,
            lane_index,
        }
    }
}

/// Authoritative state of one game session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub barrier_health: i32,
    pub score: i32,
    pub money: i32,
    /// Seconds elapsed since the session started
    pub game_time: u32,
    pub difficulty_multiplier: f32,
    pub enemies: Vec<Enemy>,
    pub towers: Vec<Tower>,
    pub last_difficulty_increase: u32,
    /// Milliseconds between difficulty escalations, fixed at creation
    pub difficulty_interval: u32,
}

impl GameState {
    pub fn new(difficulty_interval: u32) -> Self {
        Self {
            barrier_health: STARTING_BARRIER_HEALTH,
            score: 0,
            money: STARTING_MONEY,
            game_time: 0,
            difficulty_multiplier: 1.0,
            enemies: Vec::new(),
            towers: Vec::new(),
            last_difficulty_increase: 0,
            difficulty_interval,
        }
    }

    /// Puts every counter back to its starting value.
    /// `difficulty_interval` is kept as it was chosen at creation.
    pub fn reset(&mut self) {
        *self = Self::new(self.difficulty_interval);
    }

    pub fn find_enemy_mut(&mut self, id: EnemyId) -> Option<&mut Enemy> {
        self.enemies.iter_mut().find(|enemy| enemy.id == id)
    }

    pub fn find_tower_mut(&mut self, id: TowerId) -> Option<&mut Tower> {
        self.towers.iter_mut().find(|tower| tower.id == id)
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY_INTERVAL_MS)
    }
}

/// Events sent by clients.
///
/// Frames look like `{"event": "spawn-enemy", "data": {...}}`. The session
/// key is `sessionId` on the wire, `gameId` is accepted as well.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinGame(SessionId),
    #[serde(rename_all = "camelCase")]
    SpawnEnemy {
        #[serde(alias = "gameId")]
        session_id: SessionId,
        enemy: Enemy,
    },
    #[serde(rename_all = "camelCase")]
    EnemyDamage {
        #[serde(alias = "gameId")]
        session_id: SessionId,
        enemy_id: EnemyId,
        damage: f32,
        health: f32,
    },
    #[serde(rename_all = "camelCase")]
    TowerPlaced {
        #[serde(alias = "gameId")]
        session_id: SessionId,
        tower: Tower,
    },
    #[serde(rename_all = "camelCase")]
    TowerMove {
        #[serde(alias = "gameId")]
        session_id: SessionId,
        tower_id: TowerId,
        x: f32,
        y: f32,
        lane_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    TowerUpgrade {
        #[serde(alias = "gameId")]
        session_id: SessionId,
        tower_id: TowerId,
    },
    DebugTime(SessionId),
    LeaveGame(SessionId),
    EndGame(SessionId),
}

impl ClientEvent {
    /// Session the event is addressed to
    pub fn session_id(&self) -> &str {
        match self {
            ClientEvent::JoinGame(session_id)
            | ClientEvent::DebugTime(session_id)
            | ClientEvent::LeaveGame(session_id)
            | ClientEvent::EndGame(session_id)
            | ClientEvent::SpawnEnemy { session_id, .. }
            | ClientEvent::EnemyDamage { session_id, .. }
            | ClientEvent::TowerPlaced { session_id, .. }
            | ClientEvent::TowerMove { session_id, .. }
            | ClientEvent::TowerUpgrade { session_id, .. } => session_id,
        }
    }
}

/// Events pushed by the server to session members.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    GameState(GameState),
    EnemySpawned(Enemy),
    #[serde(rename_all = "camelCase")]
    EnemyHealthUpdate {
        enemy_id: EnemyId,
        health: f32,
    },
    EnemyDestroyed(EnemyId),
    #[serde(rename_all = "camelCase")]
    TowerMoved {
        tower_id: TowerId,
        x: f32,
        y: f32,
        lane_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    TowerUpgraded {
        tower_id: TowerId,
        level: u32,
    },
    DifficultyIncrease(f32),
    #[serde(rename_all = "camelCase")]
    GameTimeUpdate {
        game_time: u32,
        difficulty_multiplier: f32,
    },
    GameEnded(SessionId),
}
