//! # Tower Defense Relay Server Library
//!
//! This library provides the real-time relay for a multiplayer tower-defense
//! game. Clients connect over WebSocket, join named game sessions, and report
//! what happens on their screen. The server keeps one authoritative game state
//! per session, applies each report to it, and fans the results out to every
//! connection subscribed to that session.
//!
//! ## Core Responsibilities
//!
//! ### Session State
//! Each session carries its own barrier health, score, money, game clock,
//! difficulty multiplier, enemies and towers. Sessions are created on first
//! join and reset whenever someone joins them again.
//!
//! ### Event Relay
//! Gameplay events (enemy spawns and damage, tower placement, moves and
//! upgrades) mutate the session they name and produce server events that are
//! broadcast to the session group, including the sender. Events naming a
//! session that does not exist are dropped without a reply.
//!
//! ### Game Clock
//! Every session advances one second of game time per tick and raises its
//! difficulty at a configurable interval of game time.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All session and connection state lives in one [`router::EventRouter`]
//! owned by the main loop in [`network::Server`]. Connection tasks and session
//! timers only post messages to it, so handlers never race each other.
//!
//! ### Session Lifecycle
//! A session is active while it has subscribers. When the last one leaves or
//! disconnects it turns idle, and the reaper removes it once the idle timeout
//! passes. `end-game` removes a session immediately.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Runtime settings: bind address, tick period, difficulty interval, idle
//! timeout and connection limit.
//!
//! ### Connection Manager Module (`connection_manager`)
//! Open connections, their outbound queues, and session group membership.
//!
//! ### Game Module (`game`)
//! Gameplay handlers that turn one client event into state changes and the
//! server events describing them.
//!
//! ### Scheduler Module (`scheduler`)
//! Per-session timer tasks and the game-time advance applied on every tick.
//!
//! ### Session Module (`session`)
//! The session store and its active/idle lifecycle.
//!
//! ### Records Module (`records`)
//! Durable game, tower, enemy and bullet records kept apart from real-time
//! state.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:3000".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Accepts connections, routes events and drives session clocks
//!     let mut server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Trust Model
//!
//! Clients are trusted. Health values, tower costs and entity ids arrive from
//! clients and are applied as sent; money may go negative. Authorization and
//! cheat prevention are left to whatever sits in front of this server.

pub mod config;
pub mod connection_manager;
pub mod error;
pub mod game;
pub mod network;
pub mod records;
pub mod router;
pub mod scheduler;
pub mod session;
