//! Durable game records.
//!
//! Rows created here outlive the real-time sessions: a game owned by a user,
//! and the towers, enemies and bullets recorded against it. Real-time ticks
//! are never written here. [`InMemoryRecordStore`] is the bundled
//! implementation; anything backed by a database implements [`RecordStore`].
//!
//! The relay server does not call into this module. No REST surface is wired
//! up here; an HTTP layer or a database-backed store plugs in at this trait.

use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub type GameRecordId = u64;
pub type UserId = u64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("game {0} not found")]
    GameNotFound(GameRecordId),
    #[error("game {0} does not exist")]
    InvalidGame(GameRecordId),
    #[error("tower {tower_id} not found in game {game_id}")]
    TowerNotFound { game_id: GameRecordId, tower_id: u64 },
    #[error("enemy {enemy_id} not found in game {game_id}")]
    EnemyNotFound { game_id: GameRecordId, enemy_id: u64 },
    #[error("bullet {bullet_id} not found in game {game_id}")]
    BulletNotFound { game_id: GameRecordId, bullet_id: u64 },
    #[error("record store unavailable")]
    Unavailable,
}

impl RecordError {
    /// HTTP status a REST caller should see for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            RecordError::GameNotFound(_) | RecordError::TowerNotFound { .. } => 404,
            _ => 400,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: GameRecordId,
    pub user_id: UserId,
    pub score: i32,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TowerRecord {
    pub id: u64,
    pub game_id: GameRecordId,
    #[serde(rename = "type")]
    pub tower_type: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnemyRecord {
    pub id: u64,
    pub game_id: GameRecordId,
    #[serde(rename = "type")]
    pub enemy_type: String,
    pub x: f32,
    pub y: f32,
    pub health: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulletRecord {
    pub id: u64,
    pub game_id: GameRecordId,
    pub tower_id: u64,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewTower {
    #[serde(rename = "type")]
    pub tower_type: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewEnemy {
    #[serde(rename = "type")]
    pub enemy_type: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewBullet {
    pub tower_id: u64,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
}

/// Partial enemy update; absent fields keep their stored value
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnemyUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub health: Option<f32>,
}

/// A game with everything recorded against it
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(flatten)]
    pub game: GameRecord,
    pub towers: Vec<TowerRecord>,
    pub enemies: Vec<EnemyRecord>,
    pub bullets: Vec<BulletRecord>,
}

pub trait RecordStore: Send + Sync {
    fn create_game(&self, user_id: UserId) -> Result<GameRecord, RecordError>;
    fn create_tower(&self, game_id: GameRecordId, tower: NewTower)
        -> Result<TowerRecord, RecordError>;
    fn create_enemy(&self, game_id: GameRecordId, enemy: NewEnemy)
        -> Result<EnemyRecord, RecordError>;
    fn create_bullet(
        &self,
        game_id: GameRecordId,
        bullet: NewBullet,
    ) -> Result<BulletRecord, RecordError>;
    fn update_enemy(
        &self,
        game_id: GameRecordId,
        enemy_id: u64,
        update: EnemyUpdate,
    ) -> Result<EnemyRecord, RecordError>;
    fn update_bullet(
        &self,
        game_id: GameRecordId,
        bullet_id: u64,
        x: f32,
        y: f32,
    ) -> Result<BulletRecord, RecordError>;
    fn relocate_tower(
        &self,
        game_id: GameRecordId,
        tower_id: u64,
        x: f32,
        y: f32,
    ) -> Result<TowerRecord, RecordError>;
    fn get_game(&self, game_id: GameRecordId) -> Result<GameSnapshot, RecordError>;
    fn list_towers(&self, game_id: GameRecordId) -> Result<Vec<TowerRecord>, RecordError>;
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

#[derive(Debug, Default)]
struct Tables {
    games: BTreeMap<GameRecordId, GameRecord>,
    towers: BTreeMap<u64, TowerRecord>,
    enemies: BTreeMap<u64, EnemyRecord>,
    bullets: BTreeMap<u64, BulletRecord>,
    last_game_id: u64,
    last_tower_id: u64,
    last_enemy_id: u64,
    last_bullet_id: u64,
}

impl Tables {
    fn require_game(&self, game_id: GameRecordId) -> Result<(), RecordError> {
        if self.games.contains_key(&game_id) {
            Ok(())
        } else {
            Err(RecordError::InvalidGame(game_id))
        }
    }
}

/// Record store kept in process memory. Ids start at 1 per table.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, RecordError>,
    ) -> Result<T, RecordError> {
        let mut tables = self.tables.lock().map_err(|_| {
            error!("Record store lock poisoned");
            RecordError::Unavailable
        })?;
        f(&mut tables)
    }
}

impl RecordStore for InMemoryRecordStore {
    fn create_game(&self, user_id: UserId) -> Result<GameRecord, RecordError> {
        self.with_tables(|tables| {
            tables.last_game_id += 1;
            let game = GameRecord {
                id: tables.last_game_id,
                user_id,
                score: 0,
                created_at: now_millis(),
            };
            debug!("Recorded game {} for user {}", game.id, user_id);
            tables.games.insert(game.id, game.clone());
            Ok(game)
        })
    }

    fn create_tower(
        &self,
        game_id: GameRecordId,
        tower: NewTower,
    ) -> Result<TowerRecord, RecordError> {
        self.with_tables(|tables| {
            tables.require_game(game_id)?;
            tables.last_tower_id += 1;
            let record = TowerRecord {
                id: tables.last_tower_id,
                game_id,
                tower_type: tower.tower_type,
                x: tower.x,
                y: tower.y,
            };
            tables.towers.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn create_enemy(
        &self,
        game_id: GameRecordId,
        enemy: NewEnemy,
    ) -> Result<EnemyRecord, RecordError> {
        self.with_tables(|tables| {
            tables.require_game(game_id)?;
            tables.last_enemy_id += 1;
            let record = EnemyRecord {
                id: tables.last_enemy_id,
                game_id,
                enemy_type: enemy.enemy_type,
                x: enemy.x,
                y: enemy.y,
                health: None,
            };
            tables.enemies.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn create_bullet(
        &self,
        game_id: GameRecordId,
        bullet: NewBullet,
    ) -> Result<BulletRecord, RecordError> {
        self.with_tables(|tables| {
            tables.require_game(game_id)?;
            tables.last_bullet_id += 1;
            let record = BulletRecord {
                id: tables.last_bullet_id,
                game_id,
                tower_id: bullet.tower_id,
                x: bullet.x,
                y: bullet.y,
                target_x: bullet.target_x,
                target_y: bullet.target_y,
            };
            tables.bullets.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn update_enemy(
        &self,
        game_id: GameRecordId,
        enemy_id: u64,
        update: EnemyUpdate,
    ) -> Result<EnemyRecord, RecordError> {
        self.with_tables(|tables| {
            let enemy = tables
                .enemies
                .get_mut(&enemy_id)
                .filter(|enemy| enemy.game_id == game_id)
                .ok_or(RecordError::EnemyNotFound { game_id, enemy_id })?;

            if let Some(x) = update.x {
                enemy.x = x;
            }
            if let Some(y) = update.y {
                enemy.y = y;
            }
            if update.health.is_some() {
                enemy.health = update.health;
            }
            Ok(enemy.clone())
        })
    }

    fn update_bullet(
        &self,
        game_id: GameRecordId,
        bullet_id: u64,
        x: f32,
        y: f32,
    ) -> Result<BulletRecord, RecordError> {
        self.with_tables(|tables| {
            let bullet = tables
                .bullets
                .get_mut(&bullet_id)
                .filter(|bullet| bullet.game_id == game_id)
                .ok_or(RecordError::BulletNotFound { game_id, bullet_id })?;
            bullet.x = x;
            bullet.y = y;
            Ok(bullet.clone())
        })
    }

    fn relocate_tower(
        &self,
        game_id: GameRecordId,
        tower_id: u64,
        x: f32,
        y: f32,
    ) -> Result<TowerRecord, RecordError> {
        self.with_tables(|tables| {
            let tower = tables
                .towers
                .get_mut(&tower_id)
                .filter(|tower| tower.game_id == game_id)
                .ok_or(RecordError::TowerNotFound { game_id, tower_id })?;
            tower.x = x;
            tower.y = y;
            Ok(tower.clone())
        })
    }

    fn get_game(&self, game_id: GameRecordId) -> Result<GameSnapshot, RecordError> {
        self.with_tables(|tables| {
            let game = tables
                .games
                .get(&game_id)
                .cloned()
                .ok_or(RecordError::GameNotFound(game_id))?;

            Ok(GameSnapshot {
                game,
                towers: tables
                    .towers
                    .values()
                    .filter(|tower| tower.game_id == game_id)
                    .cloned()
                    .collect(),
                enemies: tables
                    .enemies
                    .values()
                    .filter(|enemy| enemy.game_id == game_id)
                    .cloned()
                    .collect(),
                bullets: tables
                    .bullets
                    .values()
                    .filter(|bullet| bullet.game_id == game_id)
                    .cloned()
                    .collect(),
            })
        })
    }

    fn list_towers(&self, game_id: GameRecordId) -> Result<Vec<TowerRecord>, RecordError> {
        self.with_tables(|tables| {
            Ok(tables
                .towers
                .values()
                .filter(|tower| tower.game_id == game_id)
                .cloned()
                .collect())
        })
    }
}
