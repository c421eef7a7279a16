//! Connection tracking and session group fan-out
//!
//! This module keeps the server-side view of every open WebSocket connection:
//! - Connection lifecycle (open, close) and capacity enforcement
//! - Which sessions each connection has joined
//! - Which connections belong to each session group
//! - Send-and-forget delivery of server events to one connection or a group
//!
//! Delivery never blocks: each connection owns an unbounded outbound queue
//! drained by its writer task. A closed queue only means the connection is
//! on its way out, and the close message will clean it up.

use log::{debug, info};
use shared::{ServerEvent, SessionId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

/// Outbound half of a connection, drained by its writer task
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Represents one open connection and its session memberships
#[derive(Debug)]
pub struct Connection {
    /// Identifier assigned when the socket was accepted
    pub id: ConnectionId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the handshake completed
    pub connected_at: Instant,
    /// Sessions this connection is subscribed to
    pub sessions: HashSet<SessionId>,
    sender: EventSender,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: EventSender) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sessions: HashSet::new(),
            sender,
        }
    }

    /// Queues an event for this connection. Returns false if the writer is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Manages all open connections and the session groups they joined
///
/// Group membership is kept in both directions so that fan-out to a session
/// and cleanup of a closing connection are both a single lookup.
pub struct ConnectionManager {
    /// Open connections indexed by id
    connections: HashMap<ConnectionId, Connection>,
    /// Session id to subscribed connection ids, ordered for stable fan-out
    groups: HashMap<SessionId, BTreeSet<ConnectionId>>,
    /// Maximum number of concurrent connections allowed
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            groups: HashMap::new(),
            max_connections,
        }
    }

    /// Registers a freshly accepted connection.
    ///
    /// Returns false when the server is at capacity; the sender is dropped,
    /// which closes the connection's writer.
    pub fn add_connection(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        sender: EventSender,
    ) -> bool {
        if self.connections.len() >= self.max_connections {
            info!("Rejecting connection {} from {}: server full", id, addr);
            return false;
        }

        info!("Connection {} opened from {}", id, addr);
        self.connections
            .insert(id, Connection::new(id, addr, sender));
        true
    }

    /// Removes a connection and unsubscribes it from every session.
    /// Returns the sessions it was a member of.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Vec<SessionId> {
        let Some(connection) = self.connections.remove(&id) else {
            return Vec::new();
        };

        let sessions: Vec<SessionId> = connection.sessions.into_iter().collect();
        for session_id in &sessions {
            self.remove_member(session_id, id);
        }

        info!(
            "Connection {} closed after {:?}",
            id,
            connection.connected_at.elapsed()
        );
        sessions
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Subscribes a connection to a session group. Unknown connections are ignored.
    pub fn join(&mut self, id: ConnectionId, session_id: &str) -> bool {
        let Some(connection) = self.connections.get_mut(&id) else {
            return false;
        };

        connection.sessions.insert(session_id.to_string());
        self.groups
            .entry(session_id.to_string())
            .or_default()
            .insert(id);
        debug!("Connection {} joined session {}", id, session_id);
        true
    }

    /// Unsubscribes a connection from a session group
    pub fn leave(&mut self, id: ConnectionId, session_id: &str) -> bool {
        let was_member = self
            .connections
            .get_mut(&id)
            .map(|connection| connection.sessions.remove(session_id))
            .unwrap_or(false);

        if was_member {
            self.remove_member(session_id, id);
            debug!("Connection {} left session {}", id, session_id);
        }
        was_member
    }

    /// Drops a whole session group, returning the connections that were in it
    pub fn disband(&mut self, session_id: &str) -> Vec<ConnectionId> {
        let members: Vec<ConnectionId> = self
            .groups
            .remove(session_id)
            .map(|members| members.into_iter().collect())
            .unwrap_or_default();

        for id in &members {
            if let Some(connection) = self.connections.get_mut(id) {
                connection.sessions.remove(session_id);
            }
        }
        members
    }

    fn remove_member(&mut self, session_id: &str, id: ConnectionId) {
        if let Some(members) = self.groups.get_mut(session_id) {
            members.remove(&id);
            if members.is_empty() {
                self.groups.remove(session_id);
            }
        }
    }

    pub fn members(&self, session_id: &str) -> Vec<ConnectionId> {
        self.groups
            .get(session_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, session_id: &str) -> usize {
        self.groups.get(session_id).map_or(0, BTreeSet::len)
    }

    /// Sends an event to a single connection
    pub fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(&id) {
            Some(connection) => connection.send(event),
            None => false,
        }
    }

    /// Sends an event to every member of a session group, including the
    /// connection that caused it. Returns how many queues accepted it.
    pub fn broadcast(&self, session_id: &str, event: &ServerEvent) -> usize {
        let Some(members) = self.groups.get(session_id) else {
            return 0;
        };

        members
            .iter()
            .filter_map(|id| self.connections.get(id))
            .filter(|connection| connection.send(event.clone()))
            .count()
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
