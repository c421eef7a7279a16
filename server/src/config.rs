use shared::DEFAULT_DIFFICULTY_INTERVAL_MS;
use std::time::Duration;

/// Runtime settings for the relay server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Wall time between two game-time ticks of a session
    pub tick_interval: Duration,
    /// Difficulty interval given to newly created sessions, in milliseconds
    pub difficulty_interval_ms: u32,
    /// How long a session without subscribers survives. `None` keeps it forever.
    pub idle_timeout: Option<Duration>,
    /// How often idle sessions are looked for
    pub reap_interval: Duration,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            tick_interval: Duration::from_millis(1000),
            difficulty_interval_ms: DEFAULT_DIFFICULTY_INTERVAL_MS,
            idle_timeout: Some(Duration::from_secs(300)),
            reap_interval: Duration::from_secs(1),
            max_connections: 256,
        }
    }
}
