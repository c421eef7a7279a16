//! Registry of live game sessions.
//!
//! The store owns every session's [`GameState`] together with its lifecycle
//! and the cancellation token of its tick task. Sessions are created lazily on
//! the first join, reset in place on every later join, and removed either by
//! an explicit end or by the idle reaper.

use log::info;
use shared::{GameState, SessionId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Whether anyone is still subscribed to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Idle { since: Instant },
}

#[derive(Debug)]
struct SessionEntry {
    state: GameState,
    lifecycle: Lifecycle,
    /// Distinguishes this session from earlier ones stored under the same id
    generation: u64,
    ticker: Option<CancellationToken>,
}

impl SessionEntry {
    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

pub struct SessionStore {
    sessions: HashMap<SessionId, SessionEntry>,
    /// Difficulty interval handed to newly created sessions
    difficulty_interval_ms: u32,
    next_generation: u64,
}

impl SessionStore {
    pub fn new(difficulty_interval_ms: u32) -> Self {
        Self {
            sessions: HashMap::new(),
            difficulty_interval_ms,
            next_generation: 0,
        }
    }

    /// Returns the session's state, creating it with defaults when absent.
    ///
    /// An existing session is reset in place to the same defaults, so joining
    /// a running game wipes its progress. The boolean is true only when the
    /// session was just created.
    pub fn get_or_create(&mut self, session_id: &str) -> (&mut GameState, bool) {
        let difficulty_interval_ms = self.difficulty_interval_ms;
        let generation = self.next_generation;
        let mut is_new = false;

        let entry = self
            .sessions
            .entry(session_id.to_string())
            .and_modify(|entry| {
                entry.state.reset();
                entry.lifecycle = Lifecycle::Active;
            })
            .or_insert_with(|| {
                is_new = true;
                SessionEntry {
                    state: GameState::new(difficulty_interval_ms),
                    lifecycle: Lifecycle::Active,
                    generation,
                    ticker: None,
                }
            });

        if is_new {
            self.next_generation += 1;
            info!("Created session {}", session_id);
        } else {
            info!("Reset session {}", session_id);
        }

        (&mut entry.state, is_new)
    }

    pub fn get(&self, session_id: &str) -> Option<&GameState> {
        self.sessions.get(session_id).map(|entry| &entry.state)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut GameState> {
        self.sessions.get_mut(session_id).map(|entry| &mut entry.state)
    }

    /// Generation of the live session under this id. A session created after
    /// an earlier one was removed always gets a different generation.
    pub fn generation(&self, session_id: &str) -> Option<u64> {
        self.sessions.get(session_id).map(|entry| entry.generation)
    }

    pub fn lifecycle(&self, session_id: &str) -> Option<Lifecycle> {
        self.sessions.get(session_id).map(|entry| entry.lifecycle)
    }

    /// Hands the session the token of its tick task. Cancelling happens on removal.
    pub fn attach_ticker(&mut self, session_id: &str, ticker: CancellationToken) {
        match self.sessions.get_mut(session_id) {
            Some(entry) => {
                entry.cancel_ticker();
                entry.ticker = Some(ticker);
            }
            None => ticker.cancel(),
        }
    }

    /// Starts the idle clock unless it is already running
    pub fn mark_idle(&mut self, session_id: &str, now: Instant) {
        if let Some(entry) = self.sessions.get_mut(session_id) {
            if entry.lifecycle == Lifecycle::Active {
                entry.lifecycle = Lifecycle::Idle { since: now };
            }
        }
    }

    /// Drops a session and stops its tick task
    pub fn remove(&mut self, session_id: &str) -> Option<GameState> {
        let mut entry = self.sessions.remove(session_id)?;
        entry.cancel_ticker();
        info!("Removed session {}", session_id);
        Some(entry.state)
    }

    /// Removes every session that has been idle for at least `timeout`
    pub fn reap_idle(&mut self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, entry)| match entry.lifecycle {
                Lifecycle::Idle { since } => now.saturating_duration_since(since) >= timeout,
                Lifecycle::Active => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &expired {
            info!("Reaping idle session {}", session_id);
            self.remove(session_id);
        }

        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Enemy, Tower};

    #[test]
    fn test_first_join_creates_with_defaults() {
        let mut store = SessionStore::new(15_000);

        let (state, is_new) = store.get_or_create("g1");
        assert!(is_new);
        assert_eq!(*state, GameState::new(15_000));
        assert_eq!(store.len(), 1);
        assert_eq!(store.lifecycle("g1"), Some(Lifecycle::Active));
    }

    #[test]
    fn test_rejoin_resets_in_place() {
        let mut store = SessionStore::new(15_000);
        {
            let (state, _) = store.get_or_create("g1");
            state.score = 40;
            state.money = 5;
            state.game_time = 61;
            state.difficulty_multiplier = 1.8;
            state.enemies.push(Enemy::new(1, 0, 20.0));
            state.towers.push(Tower::new(1, 0, 50));
        }

        let (state, is_new) = store.get_or_create("g1");
        assert!(!is_new);
        assert_eq!(*state, GameState::new(15_000));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_recreated_session_gets_new_generation() {
        let mut store = SessionStore::new(15_000);
        store.get_or_create("g1");
        let first = store.generation("g1").unwrap();

        store.get_or_create("g1");
        assert_eq!(store.generation("g1"), Some(first));

        store.remove("g1");
        assert_eq!(store.generation("g1"), None);

        store.get_or_create("g1");
        assert_ne!(store.generation("g1"), Some(first));
    }

    #[test]
    fn test_get_unknown_session() {
        let mut store = SessionStore::new(15_000);
        assert!(store.get("nope").is_none());
        assert!(store.get_mut("nope").is_none());
        assert!(store.remove("nope").is_none());
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut store = SessionStore::new(15_000);
        store.get_or_create("a").0.money = 1;
        store.get_or_create("b");

        assert_eq!(store.get("a").unwrap().money, 1);
        assert_eq!(store.get("b").unwrap().money, 100);
    }

    #[test]
    fn test_remove_cancels_ticker() {
        let mut store = SessionStore::new(15_000);
        store.get_or_create("g1");
        let token = CancellationToken::new();
        store.attach_ticker("g1", token.clone());

        assert!(!token.is_cancelled());
        assert!(store.remove("g1").is_some());
        assert!(token.is_cancelled());
        assert!(store.is_empty());
    }

    #[test]
    fn test_attach_ticker_to_missing_session_cancels_it() {
        let mut store = SessionStore::new(15_000);
        let token = CancellationToken::new();
        store.attach_ticker("ghost", token.clone());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_reap_only_expired_idle_sessions() {
        let mut store = SessionStore::new(15_000);
        let start = Instant::now();
        store.get_or_create("idle");
        store.get_or_create("fresh");
        store.get_or_create("busy");

        let idle_token = CancellationToken::new();
        store.attach_ticker("idle", idle_token.clone());

        store.mark_idle("idle", start);
        store.mark_idle("fresh", start + Duration::from_secs(50));

        let reaped = store.reap_idle(start + Duration::from_secs(60), Duration::from_secs(30));

        assert_eq!(reaped, vec!["idle".to_string()]);
        assert!(idle_token.is_cancelled());
        assert!(store.get("idle").is_none());
        assert!(store.get("fresh").is_some());
        assert!(store.get("busy").is_some());
    }

    #[test]
    fn test_mark_idle_keeps_first_timestamp() {
        let mut store = SessionStore::new(15_000);
        let start = Instant::now();
        store.get_or_create("g1");

        store.mark_idle("g1", start);
        store.mark_idle("g1", start + Duration::from_secs(10));

        assert_eq!(store.lifecycle("g1"), Some(Lifecycle::Idle { since: start }));
    }

    #[test]
    fn test_rejoin_reactivates_idle_session() {
        let mut store = SessionStore::new(15_000);
        let start = Instant::now();
        store.get_or_create("g1");
        store.mark_idle("g1", start);

        store.get_or_create("g1");

        assert_eq!(store.lifecycle("g1"), Some(Lifecycle::Active));
        assert!(store
            .reap_idle(start + Duration::from_secs(600), Duration::from_secs(1))
            .is_empty());
    }
}
