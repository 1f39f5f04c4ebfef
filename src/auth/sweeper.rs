use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::auth::session::SessionManager;

/// Background task that purges expired session rows on a fixed interval.
///
/// The first sweep runs one full interval after spawn. Shutdown is checked
/// between sweeps; a sweep already running finishes before the task exits.
pub struct SessionSweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionSweeper {
    pub fn spawn(manager: SessionManager, every: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_loop(manager, every, shutdown_rx));

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Session sweeper ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn sweep_loop(manager: SessionManager, every: Duration, shutdown: watch::Receiver<bool>) {
    tracing::info!(interval_secs = every.as_secs_f64(), "Session sweeper started");

    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    run_until_shutdown(&manager, ticker, shutdown).await;

    tracing::info!("Stopping session sweeper");
}

async fn run_until_shutdown(
    manager: &SessionManager,
    mut ticker: Interval,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            // Shutdown wins when both are ready
            biased;

            changed = shutdown.changed() => {
                // A dropped sender also means stop
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(manager).await;
            }
        }
    }
}

async fn sweep_once(manager: &SessionManager) {
    let manager = manager.clone();
    match tokio::task::spawn_blocking(move || manager.cleanup_expired_sessions()).await {
        Ok(Ok(0)) => {}
        Ok(Ok(removed)) => tracing::info!(removed, "Cleaned up expired sessions"),
        Ok(Err(e)) => tracing::warn!("Failed to clean up expired sessions: {}", e),
        Err(e) => tracing::warn!("Session cleanup task panicked: {}", e),
    }
}
