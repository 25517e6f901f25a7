//! Periodic persistence of the latch.
//!
//! The flusher wakes on a fixed interval and, if the latch is dirty, commits
//! the current value to the store. Failures are logged and retried on the
//! next wake with no backoff: store failures are expected to be rare and
//! transient, and an unpersisted trigger must not be abandoned.
//!
//! Store calls may block, so each flush runs on the blocking thread pool.
//! On shutdown the flusher performs one last flush before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::latch::{FlushOutcome, Latch};

/// Default wake interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Background task that persists the latch while it is dirty.
#[derive(Debug)]
pub struct Flusher {
    latch: Arc<Latch>,
    interval: Duration,
}

impl Flusher {
    pub fn new(latch: Arc<Latch>, interval: Duration) -> Self {
        Flusher { latch, interval }
    }

    /// Runs one flush on the blocking pool.
    ///
    /// Returns `None` if the flush failed; the failure has been logged and
    /// the latch is still dirty.
    pub async fn flush_once(&self) -> Option<FlushOutcome> {
        let latch = Arc::clone(&self.latch);
        match tokio::task::spawn_blocking(move || latch.flush()).await {
            Ok(Ok(outcome)) => {
                match outcome {
                    FlushOutcome::Clean => trace!("Latch clean"),
                    FlushOutcome::Persisted { triggered } => {
                        debug!(triggered, "Latch persisted")
                    }
                    FlushOutcome::Superseded { triggered } => {
                        debug!(triggered, "Latch changed during flush, retrying next wake")
                    }
                }
                Some(outcome)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to persist latch, retrying next wake");
                None
            }
            Err(e) => {
                error!(error = %e, "Flush task failed");
                None
            }
        }
    }

    /// Runs the flush loop until `shutdown` is cancelled.
    #[instrument(skip_all, fields(interval_ms = self.interval.as_millis() as u64))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Flusher started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
            }
        }

        if self.latch.state().dirty {
            debug!("Final flush before shutdown");
            self.flush_once().await;
        }

        info!("Flusher stopped");
    }
}
