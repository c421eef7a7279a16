use futures_util::{Sink, SinkExt, StreamExt};
use log::{info, warn};
use rand::Rng;
use shared::{ClientEvent, Enemy, ServerEvent, Tower};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn send(
    write: &mut (impl Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    event: &ClientEvent,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Sending: {:?}", event);
    write
        .send(Message::Text(serde_json::to_string(event)?))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:3000".to_string());
    let session_id = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "test-session".to_string());

    info!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    send(&mut write, &ClientEvent::JoinGame(session_id.clone())).await?;

    let mut rng = rand::thread_rng();
    for i in 0..5u64 {
        let enemy = Enemy::new(i + 1, rng.gen_range(0..3), rng.gen_range(50.0..150.0));
        send(
            &mut write,
            &ClientEvent::SpawnEnemy {
                session_id: session_id.clone(),
                enemy,
            },
        )
        .await?;

        let tower = Tower::new(i + 1, rng.gen_range(0..3), rng.gen_range(20..60));
        send(
            &mut write,
            &ClientEvent::TowerPlaced {
                session_id: session_id.clone(),
                tower,
            },
        )
        .await?;

        send(
            &mut write,
            &ClientEvent::EnemyDamage {
                session_id: session_id.clone(),
                enemy_id: i + 1,
                damage: 200.0,
                health: 0.0,
            },
        )
        .await?;

        // Print everything the server sent back for a second
        let deadline = sleep(Duration::from_secs(1));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::GameState(state)) => info!(
                            "Game state - health: {}, score: {}, money: {}, enemies: {}, towers: {}",
                            state.barrier_health,
                            state.score,
                            state.money,
                            state.enemies.len(),
                            state.towers.len()
                        ),
                        Ok(event) => info!("Received: {:?}", event),
                        Err(e) => warn!("Failed to parse server event: {}", e),
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        info!("Server closed the connection");
                        return Ok(());
                    }
                },
            }
        }
    }

    send(&mut write, &ClientEvent::LeaveGame(session_id)).await?;
    let _ = timeout(Duration::from_secs(1), write.close()).await;

    info!("Test client finished");
    Ok(())
}
