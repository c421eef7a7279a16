//! Server network layer handling WebSocket connections and the event loop
//!
//! Every accepted socket gets a reader and a writer task. Readers decode
//! client events and forward them to the main loop; writers drain the
//! connection's outbound queue. All session state is owned by the main loop,
//! which also receives ticks from the per-session timers.

use crate::config::ServerConfig;
use crate::connection_manager::{ConnectionId, EventSender};
use crate::error::ServerError;
use crate::router::EventRouter;
use crate::scheduler::SessionTick;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    ConnectionOpened {
        conn_id: ConnectionId,
        addr: SocketAddr,
        sender: EventSender,
    },
    EventReceived {
        conn_id: ConnectionId,
        event: ClientEvent,
    },
    ConnectionClosed {
        conn_id: ConnectionId,
    },
}

/// Main server coordinating connections, sessions and timers
pub struct Server {
    listener: Arc<TcpListener>,
    config: ServerConfig,
    router: EventRouter,
    tick_rx: mpsc::UnboundedReceiver<SessionTick>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        let (router, tick_rx) = EventRouter::new(&config);
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Arc::new(listener),
            config,
            router,
            tick_rx,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns task that accepts sockets and hands each to its own connection task
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut next_id: ConnectionId = 0;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        next_id += 1;
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            next_id,
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ConnectionOpened {
                conn_id,
                addr,
                sender,
            } => {
                if !self.router.connect(conn_id, addr, sender) {
                    warn!(
                        "Closing connection {} from {}: limit of {} reached",
                        conn_id, addr, self.config.max_connections
                    );
                }
            }
            ServerMessage::EventReceived { conn_id, event } => {
                self.router.handle_event(conn_id, event, Instant::now());
            }
            ServerMessage::ConnectionClosed { conn_id } => {
                self.router.disconnect(conn_id, Instant::now());
            }
        }
    }

    /// Main server loop coordinating all operations. Runs until the task
    /// driving it is dropped.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();

        let mut reaper = interval(self.config.reap_interval);

        info!("Server started successfully");

        loop {
            tokio::select! {
                Some(message) = self.server_rx.recv() => {
                    self.handle_message(message);
                },

                Some(tick) = self.tick_rx.recv() => {
                    self.router.tick(&tick);
                },

                _ = reaper.tick() => {
                    if let Some(timeout) = self.config.idle_timeout {
                        let reaped = self.router.reap_idle(Instant::now(), timeout);
                        if !reaped.is_empty() {
                            info!("Reaped {} idle session(s)", reaped.len());
                        }
                    }
                },
            }
        }
    }
}

/// Drives one WebSocket connection until either side goes away
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnectionId,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    if server_tx
        .send(ServerMessage::ConnectionOpened {
            conn_id,
            addr,
            sender: event_tx,
        })
        .is_err()
    {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match encode_event(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", event, e);
                    continue;
                }
            };
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    let reader_tx = server_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match decode_event(&text) {
                    Ok(event) => {
                        let message = ServerMessage::EventReceived { conn_id, event };
                        if reader_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring malformed frame from connection {}: {}", conn_id, e);
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Connection {} read error: {}", conn_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let _ = server_tx.send(ServerMessage::ConnectionClosed { conn_id });
}

pub fn encode_event(event: &ServerEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

pub fn decode_event(text: &str) -> serde_json::Result<ClientEvent> {
    serde_json::from_str(text)
}
