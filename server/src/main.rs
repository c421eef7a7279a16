use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, env = "HOST", default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, env = "PORT", default_value = "3000")]
    port: u16,
    /// Milliseconds of wall time per second of game time
    #[clap(long, env = "TICK_INTERVAL_MS", default_value = "1000")]
    tick_interval_ms: u64,
    /// Game time between difficulty increases, in milliseconds
    #[clap(long, env = "DIFFICULTY_INTERVAL_MS", default_value = "15000")]
    difficulty_interval_ms: u32,
    /// Seconds a session without subscribers is kept (0 keeps it forever)
    #[clap(long, env = "IDLE_TIMEOUT_SECS", default_value = "300")]
    idle_timeout_secs: u64,
    /// Maximum number of concurrent connections
    #[clap(short, long, env = "MAX_CONNECTIONS", default_value = "256")]
    max_connections: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            difficulty_interval_ms: self.difficulty_interval_ms,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
            max_connections: self.max_connections,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.into_config();

    info!(
        "Starting server on {} (tick {:?}, difficulty every {}ms, max {} connections)",
        config.bind_addr, config.tick_interval, config.difficulty_interval_ms, config.max_connections
    );

    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
