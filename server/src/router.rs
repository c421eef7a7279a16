//! Event routing for the relay.
//!
//! The router owns the session store, the connection groups and the tick
//! scheduler. It is driven by exactly one task (the server loop), so every
//! read-modify-broadcast sequence on a session runs without interleaving.

use crate::config::ServerConfig;
use crate::connection_manager::{ConnectionId, ConnectionManager, EventSender};
use crate::game;
use crate::scheduler::{self, SessionTick, TickScheduler};
use crate::session::SessionStore;
use log::{debug, info};
use shared::{ClientEvent, ServerEvent, SessionId};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub struct EventRouter {
    sessions: SessionStore,
    connections: ConnectionManager,
    scheduler: TickScheduler,
}

impl EventRouter {
    /// Builds a router and hands back the receiving end of its session ticks,
    /// which the caller feeds into [`EventRouter::tick`].
    pub fn new(config: &ServerConfig) -> (Self, mpsc::UnboundedReceiver<SessionTick>) {
        let (scheduler, tick_rx) = TickScheduler::new(config.tick_interval);
        let router = Self {
            sessions: SessionStore::new(config.difficulty_interval_ms),
            connections: ConnectionManager::new(config.max_connections),
            scheduler,
        };
        (router, tick_rx)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn connect(&mut self, id: ConnectionId, addr: SocketAddr, sender: EventSender) -> bool {
        self.connections.add_connection(id, addr, sender)
    }

    /// Forgets a connection. Sessions it leaves without subscribers go idle.
    pub fn disconnect(&mut self, id: ConnectionId, now: Instant) {
        for session_id in self.connections.remove_connection(id) {
            self.idle_if_empty(&session_id, now);
        }
    }

    /// Applies one inbound event from a connection.
    ///
    /// Events naming a session that does not exist are dropped without
    /// telling the sender, as are events from connections that were never
    /// accepted.
    pub fn handle_event(&mut self, id: ConnectionId, event: ClientEvent, now: Instant) {
        if !self.connections.contains(id) {
            debug!("Ignoring event from unregistered connection {}", id);
            return;
        }

        let session_id = event.session_id().to_string();

        match event {
            ClientEvent::JoinGame(_) => self.join(id, &session_id),
            ClientEvent::LeaveGame(_) => {
                if self.connections.leave(id, &session_id) {
                    self.idle_if_empty(&session_id, now);
                }
            }
            ClientEvent::EndGame(_) => self.end(&session_id),
            ClientEvent::DebugTime(_) => match self.sessions.get(&session_id) {
                Some(state) => info!(
                    "Session {} game time: {}s, difficulty: {:.1}x",
                    session_id, state.game_time, state.difficulty_multiplier
                ),
                None => debug!("Debug time for unknown session {}", session_id),
            },
            gameplay => self.apply_gameplay(&session_id, gameplay),
        }
    }

    fn join(&mut self, id: ConnectionId, session_id: &str) {
        self.connections.join(id, session_id);

        let (state, is_new) = self.sessions.get_or_create(session_id);
        let snapshot = state.clone();

        if is_new {
            if let Some(generation) = self.sessions.generation(session_id) {
                let ticker = self.scheduler.start(session_id, generation);
                self.sessions.attach_ticker(session_id, ticker);
            }
        }

        self.connections.send_to(id, ServerEvent::GameState(snapshot));
    }

    fn apply_gameplay(&mut self, session_id: &str, event: ClientEvent) {
        let Some(state) = self.sessions.get_mut(session_id) else {
            debug!("Dropping event for unknown session {}", session_id);
            return;
        };

        let events = match event {
            ClientEvent::SpawnEnemy { enemy, .. } => game::spawn_enemy(state, enemy),
            ClientEvent::EnemyDamage {
                enemy_id,
                damage,
                health,
                ..
            } => game::damage_enemy(state, enemy_id, damage, health),
            ClientEvent::TowerPlaced { tower, .. } => game::place_tower(state, tower),
            ClientEvent::TowerMove {
                tower_id,
                x,
                y,
                lane_index,
                ..
            } => game::move_tower(state, tower_id, x, y, lane_index),
            ClientEvent::TowerUpgrade { tower_id, .. } => game::upgrade_tower(state, tower_id),
            ClientEvent::JoinGame(_)
            | ClientEvent::LeaveGame(_)
            | ClientEvent::EndGame(_)
            | ClientEvent::DebugTime(_) => Vec::new(),
        };

        for event in &events {
            self.connections.broadcast(session_id, event);
        }
    }

    /// Ends a session for everyone: members are told, unsubscribed, and the
    /// session and its ticker are dropped.
    fn end(&mut self, session_id: &str) {
        if self.sessions.get(session_id).is_none() {
            debug!("End for unknown session {}", session_id);
            return;
        }

        self.connections
            .broadcast(session_id, &ServerEvent::GameEnded(session_id.to_string()));
        let members = self.connections.disband(session_id);
        self.sessions.remove(session_id);
        info!("Session {} ended with {} members", session_id, members.len());
    }

    /// Applies one elapsed period to a session. A tick for a session that no
    /// longer exists, or that was queued for an earlier session under the
    /// same id, does nothing.
    pub fn tick(&mut self, tick: &SessionTick) {
        let session_id = tick.session_id.as_str();
        if self.sessions.generation(session_id) != Some(tick.generation) {
            debug!("Dropping stale tick for session {}", session_id);
            return;
        }
        let Some(state) = self.sessions.get_mut(session_id) else {
            return;
        };

        for event in scheduler::advance(state) {
            self.connections.broadcast(session_id, &event);
        }
    }

    /// Drops sessions that have had no subscribers for `timeout`
    pub fn reap_idle(&mut self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        let reaped = self.sessions.reap_idle(now, timeout);
        for session_id in &reaped {
            self.connections.disband(session_id);
        }
        reaped
    }

    fn idle_if_empty(&mut self, session_id: &str, now: Instant) {
        if self.connections.member_count(session_id) == 0 {
            debug!("Session {} has no subscribers left", session_id);
            self.sessions.mark_idle(session_id, now);
        }
    }
}
