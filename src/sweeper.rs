//! Periodic background sweeping
//!
//! Both the session registry and the rate limiter drop stale entries on a fixed
//! interval so abandoned clients do not grow memory without bound.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawns a task that calls `sweep` every `period` until a shutdown message arrives.
///
/// The first sweep runs immediately. A zero period is clamped to one second.
/// Returns a JoinHandle for graceful shutdown coordination and a shutdown sender.
pub fn spawn_sweeper<F, Fut>(
    name: &'static str,
    period: Duration,
    mut sweep: F,
) -> (JoinHandle<()>, mpsc::Sender<()>)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send + 'static,
{
    let period = period.max(Duration::from_secs(1));
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        debug!(sweeper = name, period_secs = period.as_secs(), "Sweeper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = sweep().await;
                    debug!(sweeper = name, removed = removed, "Sweep cycle completed");
                }
                _ = shutdown_rx.recv() => {
                    info!(sweeper = name, "Sweeper received shutdown signal, stopping");
                    break;
                }
            }
        }
    });

    (handle, shutdown_tx)
}
