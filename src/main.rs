use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use doormon::config::Config;
use doormon::daemon;
use doormon::edge::{self, EdgeHandle};
use doormon::flusher::Flusher;
use doormon::indicator::{self, FileIndicator, Indicator, IndicatorFeed, LogIndicator};
use doormon::latch::Latch;
use doormon::persistence::FileStore;
use doormon::server::AppState;
use doormon::supervisor::{AlwaysUp, InterfaceLink, Supervisor};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown waits for a pending indicator write.
const INDICATOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doormon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(?config, "Starting doormon");

    let latch = Arc::new(Latch::seed(FileStore::new(
        &config.state_dir,
        &config.store_key,
    )));

    let shutdown = CancellationToken::new();
    tokio::spawn(daemon::cancel_on_signal(shutdown.clone()));

    let output: Arc<dyn Indicator> = match &config.indicator_path {
        Some(path) => Arc::new(FileIndicator::new(path)),
        None => Arc::new(LogIndicator),
    };
    let feed = IndicatorFeed::new(latch.read());
    let indicator_task = tokio::spawn(indicator::run(output, feed.subscribe(), shutdown.clone()));

    let flusher = tokio::spawn(
        Flusher::new(Arc::clone(&latch), config.flush_interval).run(shutdown.clone()),
    );
    let edges = edge::spawn(
        config.trigger.clone(),
        EdgeHandle::new(Arc::clone(&latch), feed.clone()),
        shutdown.clone(),
    );

    let app_state = AppState::new(latch, feed);
    let result = match &config.link_interface {
        Some(interface) => {
            let supervisor = Supervisor::new(
                InterfaceLink::new(interface.as_str()),
                config.supervisor.clone(),
            );
            daemon::run(&supervisor, config.listen_addr, app_state, &shutdown).await
        }
        None => {
            let supervisor = Supervisor::new(AlwaysUp, config.supervisor.clone());
            daemon::run(&supervisor, config.listen_addr, app_state, &shutdown).await
        }
    };

    shutdown.cancel();
    if let Err(e) = edges.await {
        error!(error = %e, "Edge source task failed");
    }
    if let Err(e) = flusher.await {
        error!(error = %e, "Flusher task failed");
    }
    if tokio::time::timeout(INDICATOR_DRAIN_TIMEOUT, indicator_task)
        .await
        .is_err()
    {
        warn!("Indicator write still pending at shutdown");
    }

    match result {
        Ok(()) => {
            info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}
