//! Output indicator driven by latch transitions.
//!
//! The indicator mirrors the latch for a local observer (an LED, a relay, a
//! log line). It is not part of the latch state: a failed indicator write is
//! logged and otherwise ignored.
//!
//! Writers never touch the indicator directly. Edge sources and the reset
//! handler publish the latch value on an [`IndicatorFeed`], which only swaps
//! a value and wakes a waiter. A single [`run`] task turns published values
//! into [`Indicator::show`] calls on the blocking pool, so a stuck output
//! delays nothing but itself. Values published while a write is in flight
//! coalesce into the latest one.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Something that displays whether the trigger is latched.
pub trait Indicator: Send + Sync {
    fn show(&self, triggered: bool);
}

/// Indicator that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn show(&self, triggered: bool) {
        info!(triggered, "Indicator updated");
    }
}

/// Indicator that writes `1` or `0` to a file, such as an LED `brightness`
/// attribute under `/sys/class/leds`.
#[derive(Debug, Clone)]
pub struct FileIndicator {
    path: PathBuf,
}

impl FileIndicator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileIndicator { path: path.into() }
    }
}

impl Indicator for FileIndicator {
    fn show(&self, triggered: bool) {
        let value: &[u8] = if triggered { b"1\n" } else { b"0\n" };
        if let Err(e) = std::fs::write(&self.path, value) {
            warn!(path = %self.path.display(), error = %e, "Failed to drive indicator");
        }
    }
}

/// Publishing side of the indicator.
///
/// Cheap to clone; every clone feeds the same [`run`] task. Publishing never
/// blocks and never performs I/O.
#[derive(Debug, Clone)]
pub struct IndicatorFeed {
    tx: Arc<watch::Sender<bool>>,
}

impl IndicatorFeed {
    /// Creates a feed whose first displayed value is `initial`.
    pub fn new(initial: bool) -> Self {
        let (tx, _) = watch::channel(initial);
        IndicatorFeed { tx: Arc::new(tx) }
    }

    /// Publishes the latch value. Republishing the current value is a no-op.
    pub fn publish(&self, triggered: bool) {
        self.tx.send_if_modified(|shown| {
            let modified = *shown != triggered;
            *shown = triggered;
            modified
        });
    }

    /// Returns the last published value.
    pub fn current(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Drives `indicator` with every value published on `updates` until
/// `shutdown` is cancelled or the feed is dropped.
///
/// The current value is shown once on start.
#[instrument(skip_all)]
pub async fn run(
    indicator: Arc<dyn Indicator>,
    mut updates: watch::Receiver<bool>,
    shutdown: CancellationToken,
) {
    let mut triggered = *updates.borrow_and_update();

    loop {
        let target = Arc::clone(&indicator);
        if let Err(e) = tokio::task::spawn_blocking(move || target.show(triggered)).await {
            error!(error = %e, "Indicator write task failed");
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    debug!("Indicator feed closed");
                    break;
                }
                triggered = *updates.borrow_and_update();
            }
        }
    }

    debug!("Indicator stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::{GatedIndicator, RecordingIndicator};
    use tempfile::tempdir;

    async fn wait_for_shown(indicator: &RecordingIndicator, expected: &[bool]) -> bool {
        for _ in 0..200 {
            if indicator.shown() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[test]
    fn file_indicator_writes_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brightness");
        let indicator = FileIndicator::new(&path);

        indicator.show(true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n");

        indicator.show(false);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\n");
    }

    #[test]
    fn file_indicator_write_failure_does_not_panic() {
        let dir = tempdir().unwrap();
        let indicator = FileIndicator::new(dir.path().join("missing/brightness"));

        indicator.show(true);
    }

    // ─── Feed ───

    #[test]
    fn publish_without_subscribers_does_not_fail() {
        let feed = IndicatorFeed::new(false);

        feed.publish(true);

        assert!(feed.current());
    }

    #[test]
    fn republishing_same_value_does_not_wake() {
        let feed = IndicatorFeed::new(false);
        let mut rx = feed.subscribe();
        rx.mark_unchanged();

        feed.publish(false);
        assert!(!rx.has_changed().unwrap());

        feed.publish(true);
        assert!(rx.has_changed().unwrap());
    }

    // ─── Run loop ───

    #[tokio::test]
    async fn run_shows_initial_then_published_values() {
        let feed = IndicatorFeed::new(true);
        let indicator = Arc::new(RecordingIndicator::default());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(indicator.clone(), feed.subscribe(), shutdown.clone()));

        assert!(wait_for_shown(&indicator, &[true]).await);
        feed.publish(false);
        assert!(wait_for_shown(&indicator, &[true, false]).await);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_when_feed_is_dropped() {
        let feed = IndicatorFeed::new(false);
        let rx = feed.subscribe();
        drop(feed);

        tokio::time::timeout(
            Duration::from_secs(1),
            run(Arc::new(LogIndicator), rx, CancellationToken::new()),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn blocked_indicator_coalesces_to_latest_value() {
        let feed = IndicatorFeed::new(false);
        let (indicator, release) = GatedIndicator::new();
        let indicator = Arc::new(indicator);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(indicator.clone(), feed.subscribe(), shutdown.clone()));

        while indicator.entered() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The initial write is stuck; these publishes must not wait for it.
        feed.publish(true);
        feed.publish(false);
        feed.publish(true);

        release.send(()).unwrap();
        release.send(()).unwrap();
        for _ in 0..200 {
            if indicator.shown() == [false, true] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(indicator.shown(), vec![false, true]);

        shutdown.cancel();
        task.await.unwrap();
    }
}
