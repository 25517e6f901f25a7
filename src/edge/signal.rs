//! `SIGUSR1` as an edge source.
//!
//! Lets an external detector (a udev rule, a GPIO daemon, a test harness)
//! report edges with `kill -USR1 <pid>`. Signals that arrive in quick
//! succession may coalesce into one wakeup, which is harmless for a latch.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::{EdgeHandle, EdgeSourceError};

/// Fires `edges` for each `SIGUSR1` until `shutdown` is cancelled.
#[instrument(skip_all)]
pub async fn run(edges: EdgeHandle, shutdown: CancellationToken) -> Result<(), EdgeSourceError> {
    let mut signals = signal(SignalKind::user_defined1()).map_err(EdgeSourceError::Signal)?;
    info!("Listening for SIGUSR1 edges");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = signals.recv() => match received {
                Some(()) => {
                    edges.fire();
                }
                None => break,
            },
        }
    }

    info!("Signal edge source stopped");
    Ok(())
}
