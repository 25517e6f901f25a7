//! Polls a doormon device and reports trigger events.
//!
//! Usage: `doormon-monitor [BASE_URL]`. Without an argument the URL comes
//! from `DOORMON_URL`. Type `r` or `reset` and Enter to reset the device.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use doormon::monitor::{DEFAULT_BASE_URL, Monitor, MonitorConfig, is_reset_command};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// doormon monitor - polls a device and reports trigger events
#[derive(Parser, Debug, Clone)]
#[command(name = "doormon-monitor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Device base URL, e.g. http://192.168.1.40:8080 or 192.168.1.40:8080
    #[arg(env = "DOORMON_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Seconds between status polls
    #[arg(long, default_value_t = 1.0, value_parser = parse_secs)]
    interval: f64,

    /// Responses slower than this many seconds are reported as slow
    #[arg(long, default_value_t = 3.0, value_parser = parse_secs)]
    slow_after: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 4.0, value_parser = parse_secs)]
    timeout: f64,
}

impl Args {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs_f64(self.interval),
            slow_after: Duration::from_secs_f64(self.slow_after),
            timeout: Duration::from_secs_f64(self.timeout),
            ..MonitorConfig::new(&self.base_url)
        }
    }
}

fn parse_secs(raw: &str) -> Result<f64, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err("must be a positive number of seconds".to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doormon=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.monitor_config();

    let mut monitor = match Monitor::new(&config) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Monitoring doormon at {}", monitor.client().base_url());
    println!(
        "Polling /status every {}s. Press 'r' + Enter to reset. Ctrl+C to quit.",
        args.interval
    );
    println!();

    let (reset_tx, mut reset_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_reset_command(&line) && reset_tx.send(()).is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nBye.");
                return ExitCode::SUCCESS;
            }
            Some(()) = reset_rx.recv() => {
                println!("{}", monitor.reset().await);
            }
            _ = ticker.tick() => {
                for report in monitor.poll().await {
                    println!("{report}");
                }
            }
        }
    }
}
