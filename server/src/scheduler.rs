//! Per-session game clock.
//!
//! Every session gets one timer task when it is created. The task never
//! touches the session itself: it posts a [`SessionTick`] to the server loop,
//! which applies [`advance`] to the session if it still exists and is still
//! the generation the ticker was started for. The task stops when its
//! cancellation token is cancelled.

use log::debug;
use shared::{GameState, ServerEvent, SessionId, DIFFICULTY_STEP};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// One elapsed period for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTick {
    pub session_id: SessionId,
    pub generation: u64,
}

pub struct TickScheduler {
    tick_tx: mpsc::UnboundedSender<SessionTick>,
    period: Duration,
}

impl TickScheduler {
    pub fn new(period: Duration) -> (Self, mpsc::UnboundedReceiver<SessionTick>) {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        (Self { tick_tx, period }, tick_rx)
    }

    /// Spawns the timer task for a session and returns the token that stops it.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, session_id: &str, generation: u64) -> CancellationToken {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let tick_tx = self.tick_tx.clone();
        let period = self.period;
        let session_id = session_id.to_string();

        debug!("Starting ticker for session {} every {:?}", session_id, period);

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first tick since it fires immediately
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Ticker for session {} cancelled", session_id);
                        break;
                    }
                    _ = timer.tick() => {
                        let tick = SessionTick {
                            session_id: session_id.clone(),
                            generation,
                        };
                        if tick_tx.send(tick).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        cancel
    }
}

/// Advances a session by one second of game time.
///
/// Raises the difficulty once `difficulty_interval` milliseconds of game time
/// have passed since the last raise, then always reports the current time.
pub fn advance(state: &mut GameState) -> Vec<ServerEvent> {
    state.game_time += 1;

    let mut events = Vec::with_capacity(2);

    let since_last = u64::from(state.game_time.saturating_sub(state.last_difficulty_increase));
    if since_last * 1000 >= u64::from(state.difficulty_interval) {
        state.difficulty_multiplier += DIFFICULTY_STEP;
        state.last_difficulty_increase = state.game_time;
        debug!(
            "Difficulty raised to {:.1}x at {}s",
            state.difficulty_multiplier, state.game_time
        );
        events.push(ServerEvent::DifficultyIncrease(state.difficulty_multiplier));
    }

    events.push(ServerEvent::GameTimeUpdate {
        game_time: state.game_time,
        difficulty_multiplier: state.difficulty_multiplier,
    });

    events
}
