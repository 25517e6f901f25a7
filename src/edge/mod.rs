//! Edge sources feeding the latch.
//!
//! An edge source detects a transition on the trigger input and calls
//! [`EdgeHandle::fire`]. Two sources ship with the daemon:
//! - [`line`]: samples a `0`/`1` value file (e.g. a sysfs GPIO `value`) and
//!   fires on each falling edge
//! - [`signal`]: each `SIGUSR1` delivered to the process is one edge
//!
//! Sources only set the latch. Persisting it is the flusher's job.

pub mod line;
#[cfg(unix)]
pub mod signal;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::indicator::IndicatorFeed;
use crate::latch::Latch;

pub use line::{FallingEdgeDetector, Level, LinePoller};

/// Errors raised by edge sources.
#[derive(Debug, Error)]
pub enum EdgeSourceError {
    /// The line value file could not be read.
    #[error("failed to read trigger line {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The line value file held something other than `0` or `1`.
    #[error("invalid line level: {0:?}")]
    InvalidLevel(String),

    /// The signal handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

/// Which edge source the daemon runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSource {
    /// `SIGUSR1` marks an edge.
    Signal,

    /// Poll a value file every `period` and fire on falling edges.
    Line { path: PathBuf, period: Duration },
}

/// Handle given to edge sources.
///
/// Cheap to clone; every clone feeds the same latch.
#[derive(Debug, Clone)]
pub struct EdgeHandle {
    latch: Arc<Latch>,
    indicator: IndicatorFeed,
}

impl EdgeHandle {
    pub fn new(latch: Arc<Latch>, indicator: IndicatorFeed) -> Self {
        EdgeHandle { latch, indicator }
    }

    /// Reports one detected edge.
    ///
    /// Returns `true` if the edge latched the trigger. Only the latch and
    /// the indicator feed are touched; the indicator write itself happens
    /// on the indicator task.
    pub fn fire(&self) -> bool {
        if self.latch.record_edge() {
            info!("Trigger latched");
            self.indicator.publish(true);
            true
        } else {
            trace!("Edge on already latched trigger");
            false
        }
    }
}

/// Spawns the configured edge source on the current runtime.
pub fn spawn(
    source: TriggerSource,
    edges: EdgeHandle,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    match source {
        TriggerSource::Line { path, period } => {
            tokio::spawn(LinePoller::new(path, period).run(edges, shutdown))
        }
        TriggerSource::Signal => tokio::spawn(async move {
            #[cfg(unix)]
            if let Err(e) = signal::run(edges, shutdown).await {
                error!(error = %e, "Signal edge source failed");
            }
            #[cfg(not(unix))]
            {
                let _ = (edges, shutdown);
                error!("Signal edge source is only available on unix");
            }
        }),
    }
}
