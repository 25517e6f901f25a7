//! Falling-edge detection on a sampled input line.
//!
//! The trigger input is pulled up and a contact pulls it low, so the event of
//! interest is a `1 → 0` transition. The first sample only establishes the
//! level; a line that is already low at startup does not fire.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{EdgeHandle, EdgeSourceError};

/// Logic level of the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl FromStr for Level {
    type Err = EdgeSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(EdgeSourceError::InvalidLevel(other.to_string())),
        }
    }
}

/// Turns a stream of level samples into falling-edge events.
#[derive(Debug, Default)]
pub struct FallingEdgeDetector {
    last: Option<Level>,
}

impl FallingEdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample. Returns `true` on a high-to-low transition.
    pub fn observe(&mut self, level: Level) -> bool {
        let fell = self.last == Some(Level::High) && level == Level::Low;
        self.last = Some(level);
        fell
    }
}

/// Edge source that samples a value file.
#[derive(Debug, Clone)]
pub struct LinePoller {
    path: PathBuf,
    period: Duration,
}

impl LinePoller {
    pub fn new(path: impl Into<PathBuf>, period: Duration) -> Self {
        LinePoller {
            path: path.into(),
            period,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn sample(&self) -> Result<Level, EdgeSourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| EdgeSourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        raw.parse()
    }

    /// Samples the line until `shutdown` is cancelled.
    ///
    /// A failed sample is logged once per failure streak and skipped; the
    /// detector keeps the last good level.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn run(self, edges: EdgeHandle, shutdown: CancellationToken) {
        info!(period_ms = self.period.as_millis() as u64, "Sampling trigger line");

        let mut detector = FallingEdgeDetector::new();
        let mut failing = false;
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sample().await {
                Ok(level) => {
                    if failing {
                        info!("Trigger line readable again");
                        failing = false;
                    }
                    if detector.observe(level) {
                        debug!("Falling edge");
                        edges.fire();
                    }
                }
                Err(e) => {
                    if !failing {
                        warn!(error = %e, "Failed to sample trigger line");
                        failing = true;
                    }
                }
            }
        }

        info!("Trigger line sampling stopped");
    }
}
