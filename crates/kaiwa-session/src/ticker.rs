//! Derived progress ticker
//!
//! A display-only task: it updates the elapsed-time field (and
//! optionally nudges the progress bar) while a turn is streaming, and
//! exits the moment the phase leaves `Streaming`. It never reads the
//! wire and never influences protocol or state-machine decisions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::state::{ConversationState, Phase};

/// Ticker behavior for one turn
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// How often the elapsed display value is refreshed
    pub period: Duration,
    /// Creep the progress bar forward between server updates
    pub auto_increment: bool,
    /// How often the auto-increment adds one percent
    pub increment_period: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            auto_increment: false,
            increment_period: Duration::from_secs(1),
        }
    }
}

/// Auto-increment never pushes progress past this; real Status chunks
/// always win.
const AUTO_INCREMENT_CAP: u8 = 90;

/// Spawn the ticker for one turn.
///
/// The task arms its timer the first time it observes `Streaming` (not
/// at Send) and finishes on its own once the phase moves on.
pub fn spawn(state: Arc<Mutex<ConversationState>>, config: TickerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut started: Option<Instant> = None;
        let mut last_increment = Instant::now();

        loop {
            interval.tick().await;
            let mut state = state.lock();
            match state.phase {
                Phase::Sending => continue,
                Phase::Streaming => {
                    let start = *started.get_or_insert_with(|| {
                        last_increment = Instant::now();
                        Instant::now()
                    });
                    state.elapsed_ms = start.elapsed().as_millis() as u64;

                    if config.auto_increment
                        && last_increment.elapsed() >= config.increment_period
                        && state.progress < AUTO_INCREMENT_CAP
                    {
                        state.progress += 1;
                        last_increment = Instant::now();
                    }
                }
                _ => return,
            }
        }
    })
}
