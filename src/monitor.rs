//! Client side of the status/reset surface, used by `doormon-monitor`.
//!
//! The monitor polls `GET /status`, reports `false → true` transitions and
//! slow or missing responses, and forwards reset requests as
//! `POST /reset`. Rendering is left to the caller: [`Monitor::poll`]
//! returns [`Report`]s whose `Display` is the line to print.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::server::{ResetBody, StatusBody};

/// Default device address when neither an argument nor `DOORMON_URL` is
/// given.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Errors raised by the monitor client.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The request failed, timed out, or returned a non-success status.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The device acknowledged a reset with `{"reset": false}`.
    #[error("device refused reset")]
    ResetRefused,
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Polling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Device base URL, e.g. `http://192.168.1.40:8080`.
    pub base_url: String,

    /// Time between status polls.
    pub poll_interval: Duration,

    /// Responses slower than this are reported as slow.
    pub slow_after: Duration,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl MonitorConfig {
    /// Builds a config for `base_url` with the default timings.
    ///
    /// A bare `host:port` gets an `http://` scheme and trailing slashes are
    /// dropped.
    pub fn new(base_url: &str) -> Self {
        MonitorConfig {
            base_url: normalize_base_url(base_url),
            ..Self::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            slow_after: Duration::from_secs(3),
            timeout: Duration::from_secs(4),
        }
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// A status reading together with how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSample {
    pub triggered: bool,
    pub elapsed: Duration,
}

/// Thin HTTP client for one device.
#[derive(Debug, Clone)]
pub struct MonitorClient {
    http: reqwest::Client,
    base_url: String,
}

impl MonitorClient {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(MonitorClient {
            http,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches `GET /status`.
    ///
    /// On failure the elapsed time is returned alongside the error so the
    /// caller can report how long it waited.
    pub async fn status(&self) -> std::result::Result<StatusSample, (MonitorError, Duration)> {
        let started = Instant::now();
        match self.fetch_status().await {
            Ok(body) => Ok(StatusSample {
                triggered: body.triggered,
                elapsed: started.elapsed(),
            }),
            Err(e) => Err((e, started.elapsed())),
        }
    }

    async fn fetch_status(&self) -> Result<StatusBody> {
        let body = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<StatusBody>()
            .await?;
        Ok(body)
    }

    /// Sends `POST /reset`.
    pub async fn reset(&self) -> Result<()> {
        let body = self
            .http
            .post(format!("{}/reset", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<ResetBody>()
            .await?;

        if body.reset {
            Ok(())
        } else {
            Err(MonitorError::ResetRefused)
        }
    }
}

/// Detects `false → true` transitions across polls.
///
/// The first reading only establishes a baseline, so a device that is
/// already triggered when the monitor starts is not reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionTracker {
    last: Option<bool>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reading. Returns `true` on a `false → true` transition.
    pub fn observe(&mut self, triggered: bool) -> bool {
        let fired = self.last == Some(false) && triggered;
        self.last = Some(triggered);
        fired
    }

    /// Forces the baseline to "not triggered" after a successful reset.
    pub fn mark_reset(&mut self) {
        self.last = Some(false);
    }
}

/// One line of monitor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Triggered,
    Slow { elapsed: Duration, threshold: Duration },
    NoResponse { elapsed: Duration },
    ResetDone,
    ResetFailed,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Triggered => write!(f, "Triggered!"),
            Report::Slow { elapsed, threshold } => write!(
                f,
                "[Slow] Response took {:.2}s (>{}s)",
                elapsed.as_secs_f64(),
                threshold.as_secs_f64()
            ),
            Report::NoResponse { elapsed } => {
                write!(f, "[Error] No response (took {:.2}s)", elapsed.as_secs_f64())
            }
            Report::ResetDone => write!(f, "[Reset] Triggered state cleared."),
            Report::ResetFailed => write!(f, "[Reset] Request failed."),
        }
    }
}

/// Poll loop state for one device.
#[derive(Debug)]
pub struct Monitor {
    client: MonitorClient,
    slow_after: Duration,
    tracker: TransitionTracker,
}

impl Monitor {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        Ok(Monitor {
            client: MonitorClient::new(config)?,
            slow_after: config.slow_after,
            tracker: TransitionTracker::new(),
        })
    }

    pub fn client(&self) -> &MonitorClient {
        &self.client
    }

    /// Polls the device once and returns what should be reported.
    pub async fn poll(&mut self) -> Vec<Report> {
        match self.client.status().await {
            Ok(sample) => {
                let mut reports = Vec::new();
                if sample.elapsed > self.slow_after {
                    reports.push(Report::Slow {
                        elapsed: sample.elapsed,
                        threshold: self.slow_after,
                    });
                }
                if self.tracker.observe(sample.triggered) {
                    reports.push(Report::Triggered);
                }
                reports
            }
            Err((e, elapsed)) => {
                debug!(error = %e, "Status poll failed");
                vec![Report::NoResponse { elapsed }]
            }
        }
    }

    /// Resets the device and rebases transition tracking on success.
    pub async fn reset(&mut self) -> Report {
        match self.client.reset().await {
            Ok(()) => {
                self.tracker.mark_reset();
                Report::ResetDone
            }
            Err(e) => {
                debug!(error = %e, "Reset request failed");
                Report::ResetFailed
            }
        }
    }
}

/// Returns `true` if a line read from stdin asks for a reset.
pub fn is_reset_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "r" | "reset")
}
