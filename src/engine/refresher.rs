use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::ConsoleSession;

/// Runs [`ConsoleSession::tick`] on a fixed period until stopped or dropped.
///
/// Each tick is spawned on its own, so a slow gateway can leave several in
/// flight; the session's refresh tickets keep the newest result.
pub struct AutoRefresher {
    handle: JoinHandle<()>,
}

impl AutoRefresher {
    /// The first tick fires one full `period` after start.
    pub fn start(session: ConsoleSession, period: Duration) -> Self {
        info!("Auto refresh every {:?}", period);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                debug!("Auto refresh tick");
                let session = session.clone();
                tokio::spawn(async move {
                    session.tick().await;
                });
            }
        });

        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for AutoRefresher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
