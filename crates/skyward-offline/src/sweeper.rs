//! Periodic expiry sweep, independent of request handling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::OfflineCache;
use crate::network::Network;

/// Default sweep cadence.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!("Offline sweeper ended abnormally: {}", e);
        }
    }
}

/// Sweep `cache` every `every`, starting one interval from now.
pub fn spawn_sweeper<N>(cache: Arc<OfflineCache<N>>, every: Duration) -> SweeperHandle
where
    N: Network + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // Skip the immediate first tick
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = cache.sweep() {
                        tracing::error!("Offline sweep failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        tracing::debug!("Offline sweeper stopped");
    });

    SweeperHandle { shutdown_tx, task }
}
