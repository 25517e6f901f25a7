//! Serving lifecycle.
//!
//! [`run`] gates the HTTP surface on the connectivity supervisor: nothing is
//! bound until the link attaches, and a lost link drains the server and
//! ends the run with an error. The latch, flusher and edge source are owned
//! by the caller and keep running regardless of the link.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::server::{AppState, build_router};
use crate::supervisor::{Link, Supervisor, SupervisorError};

/// Reasons a run ends with a failure.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Attaches the link, then serves HTTP on `addr` until `shutdown` is
/// cancelled or the link is lost.
///
/// Link loss cancels `shutdown` so the rest of the process winds down too.
/// Cancelling `shutdown` while still attaching returns `Ok` without binding.
pub async fn run<L: Link>(
    supervisor: &Supervisor<L>,
    addr: SocketAddr,
    app_state: AppState,
    shutdown: &CancellationToken,
) -> Result<(), RunError> {
    tokio::select! {
        attached = supervisor.attach() => attached?,
        _ = shutdown.cancelled() => {
            info!("Shutdown requested while attaching");
            return Ok(());
        }
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| RunError::Bind { addr, source })?;
    info!("listening on {}", addr);

    let watched = async {
        let result = supervisor.watch(shutdown.clone()).await;
        shutdown.cancel();
        result
    };
    let served = async {
        axum::serve(listener, build_router(app_state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
    };

    let (watched, served) = tokio::join!(watched, served);
    served.map_err(RunError::Serve)?;
    watched?;
    Ok(())
}

/// Cancels `token` on Ctrl-C or SIGTERM. Returns early if `token` is
/// cancelled by someone else.
pub async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}
