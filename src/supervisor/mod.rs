//! Connectivity supervision.
//!
//! The supervisor owns the network phase machine:
//!
//! ```text
//! Attaching ──probe ok──► Ready ──lost_after failed probes──► Lost
//!     │                                                      ▲
//!     └──────────── attach_attempts failed probes ───────────┘
//! ```
//!
//! `Lost` is terminal for the process: the daemon exits non-zero and relies
//! on its service manager to restart it, and on boot-time seeding to recover
//! the latch. The latch itself never waits on the supervisor.

pub mod link;

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub use link::{AlwaysUp, InterfaceLink, Link, LinkError};

/// Default number of attach probes before giving up.
const DEFAULT_ATTACH_ATTEMPTS: u32 = 5;

/// Default delay between attach probes (2 seconds).
const DEFAULT_ATTACH_RETRY_MS: u64 = 2_000;

/// Default interval between probes once ready (5 seconds).
const DEFAULT_CHECK_INTERVAL_MS: u64 = 5_000;

/// Default number of consecutive failed probes that count as a lost link.
const DEFAULT_LOST_AFTER: u32 = 3;

/// Network phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attaching,
    Ready,
    Lost,
}

/// Errors that end supervision.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The link never came up.
    #[error("link did not attach after {attempts} attempts: {last}")]
    AttachFailed {
        attempts: u32,
        #[source]
        last: LinkError,
    },

    /// The link went away after being ready.
    #[error("link lost after {failures} consecutive failed probes")]
    LinkLost { failures: u32 },
}

/// Supervisor timing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Probes made while attaching before giving up.
    pub attach_attempts: u32,

    /// Delay between attach probes.
    pub attach_retry: Duration,

    /// Interval between probes once ready.
    pub check_interval: Duration,

    /// Consecutive failed probes, once ready, that mean the link is lost.
    pub lost_after: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            attach_attempts: DEFAULT_ATTACH_ATTEMPTS,
            attach_retry: Duration::from_millis(DEFAULT_ATTACH_RETRY_MS),
            check_interval: Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS),
            lost_after: DEFAULT_LOST_AFTER,
        }
    }
}

/// Drives a [`Link`] through the phase machine.
#[derive(Debug)]
pub struct Supervisor<L> {
    link: L,
    config: SupervisorConfig,
    phase: watch::Sender<Phase>,
}

impl<L: Link> Supervisor<L> {
    pub fn new(link: L, config: SupervisorConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Attaching);
        Supervisor {
            link,
            config,
            phase,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Returns a receiver that observes phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Probes the link until it is up or the attempt budget is spent.
    #[instrument(skip(self))]
    pub async fn attach(&self) -> Result<(), SupervisorError> {
        self.phase.send_replace(Phase::Attaching);
        let attempts = self.config.attach_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.link.probe().await {
                Ok(()) => {
                    info!(attempt, "Link attached");
                    self.phase.send_replace(Phase::Ready);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    info!(attempt, attempts, error = %e, "Link not ready, retrying");
                    tokio::time::sleep(self.config.attach_retry).await;
                }
                Err(e) => {
                    error!(attempts, error = %e, "Link failed to attach");
                    self.phase.send_replace(Phase::Lost);
                    return Err(SupervisorError::AttachFailed { attempts, last: e });
                }
            }
        }
    }

    /// Probes the ready link until it is lost or `shutdown` is cancelled.
    ///
    /// A successful probe resets the failure count.
    #[instrument(skip_all)]
    pub async fn watch(&self, shutdown: CancellationToken) -> Result<(), SupervisorError> {
        let lost_after = self.config.lost_after.max(1);
        let period = self.config.check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failures = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            match self.link.probe().await {
                Ok(()) => {
                    if failures > 0 {
                        info!(failures, "Link recovered");
                    }
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    warn!(failures, lost_after, error = %e, "Link probe failed");
                    if failures >= lost_after {
                        error!(failures, "Link lost");
                        self.phase.send_replace(Phase::Lost);
                        return Err(SupervisorError::LinkLost { failures });
                    }
                }
            }
        }
    }
}
