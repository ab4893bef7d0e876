//! Background task that expires lapsed reservations.
//!
//! The sweeper is an ordinary writer: each expiry goes through the same
//! locked release path as an explicit release, so a hold can never be
//! returned to the pool twice even when a sweep races a caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};

use crate::engine::InventoryEngine;
use crate::store::StockStore;

/// Sweep cadence and batch sizing.
#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    /// Time between sweeps (default: 30 seconds).
    pub interval: Duration,
    /// Maximum reservations expired per sweep (default: 100).
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

/// Periodically releases reservations whose TTL has lapsed.
#[derive(Debug)]
pub struct ReservationSweeper<S> {
    engine: Arc<InventoryEngine<S>>,
    config: SweeperConfig,
}

impl<S: StockStore + 'static> ReservationSweeper<S> {
    /// Creates a sweeper with default cadence.
    pub fn new(engine: Arc<InventoryEngine<S>>) -> Self {
        Self::with_config(engine, SweeperConfig::default())
    }

    /// Creates a sweeper with custom cadence.
    pub const fn with_config(engine: Arc<InventoryEngine<S>>, config: SweeperConfig) -> Self {
        Self { engine, config }
    }

    /// Runs one sweep immediately, returning how many reservations were
    /// expired.
    ///
    /// Exposed so deployments that prefer an external scheduler (cron, a
    /// job queue) can drive expiry without the background task.
    pub async fn sweep_once(&self) -> crate::errors::EngineResult<usize> {
        self.engine.expire_due_reservations(self.config.batch_size).await
    }

    /// Spawns the background sweep loop on the current Tokio runtime.
    ///
    /// The loop runs until [`SweeperHandle::shutdown`] is called or the
    /// handle is dropped. Sweep failures are logged and the loop keeps
    /// going; a transient storage outage must not kill expiry for good.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_secs = self.config.interval.as_secs(),
                batch_size = self.config.batch_size,
                "reservation sweeper started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_sweep().await,
                    result = shutdown_rx.changed() => {
                        // Channel closed counts as shutdown too.
                        if result.is_err() || *shutdown_rx.borrow() {
                            info!("reservation sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });
        SweeperHandle { shutdown_tx, task }
    }

    #[instrument(skip(self))]
    async fn run_sweep(&self) {
        match self.engine.expire_due_reservations(self.config.batch_size).await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "expired lapsed reservations"),
            Err(err) => error!(error = %err, "reservation sweep failed"),
        }
    }
}

/// Handle to a running sweep loop.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(self) {
        // Ignore send failure: the task already exited.
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Aborts the loop without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }
}
