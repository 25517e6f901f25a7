//! Daemon configuration from environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration. Values that are present but malformed are errors rather
//! than silently replaced by defaults.
//!
//! | Variable | Default |
//! |---|---|
//! | `DOORMON_LISTEN_ADDR` | `0.0.0.0:8080` |
//! | `DOORMON_STATE_DIR` | `/var/lib/doormon` |
//! | `DOORMON_STORE_NAMESPACE` | `doormon` |
//! | `DOORMON_STORE_KEY` | `triggered` |
//! | `DOORMON_FLUSH_INTERVAL_MS` | `1000` |
//! | `DOORMON_TRIGGER_LINE` | unset (SIGUSR1 source) |
//! | `DOORMON_TRIGGER_POLL_MS` | `10` |
//! | `DOORMON_INDICATOR_PATH` | unset (log-only) |
//! | `DOORMON_LINK_INTERFACE` | unset (always up) |
//! | `DOORMON_ATTACH_ATTEMPTS` | `5` |
//! | `DOORMON_ATTACH_RETRY_MS` | `2000` |
//! | `DOORMON_LINK_CHECK_MS` | `5000` |
//! | `DOORMON_LINK_LOST_AFTER` | `3` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::edge::TriggerSource;
use crate::flusher::DEFAULT_FLUSH_INTERVAL;
use crate::persistence::StoreKey;
use crate::supervisor::SupervisorConfig;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_STATE_DIR: &str = "/var/lib/doormon";
const DEFAULT_TRIGGER_POLL_MS: u64 = 10;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that does not parse.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// A variable parsed but is out of range.
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Result type for configuration parsing.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP surface binds to.
    pub listen_addr: SocketAddr,

    /// Root directory of the file store.
    pub state_dir: PathBuf,

    /// Namespace and key of the stored latch value.
    pub store_key: StoreKey,

    /// Flusher wake interval.
    pub flush_interval: Duration,

    /// Where edges come from.
    pub trigger: TriggerSource,

    /// File driven with `1`/`0`, if any.
    pub indicator_path: Option<PathBuf>,

    /// Interface whose link gates the HTTP surface, if any.
    pub link_interface: Option<String>,

    /// Attach and link-loss policy.
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup: &lookup };
        let defaults = SupervisorConfig::default();

        let trigger = match vars.string("DOORMON_TRIGGER_LINE") {
            Some(path) => TriggerSource::Line {
                path: PathBuf::from(path),
                period: vars.millis("DOORMON_TRIGGER_POLL_MS", DEFAULT_TRIGGER_POLL_MS)?,
            },
            None => TriggerSource::Signal,
        };

        Ok(Config {
            listen_addr: vars.parsed("DOORMON_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?,
            state_dir: vars
                .string("DOORMON_STATE_DIR")
                .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string())
                .into(),
            store_key: StoreKey::new(
                vars.string("DOORMON_STORE_NAMESPACE")
                    .unwrap_or_else(|| StoreKey::default().namespace),
                vars.string("DOORMON_STORE_KEY")
                    .unwrap_or_else(|| StoreKey::default().key),
            ),
            flush_interval: vars.millis(
                "DOORMON_FLUSH_INTERVAL_MS",
                DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
            )?,
            trigger,
            indicator_path: vars.string("DOORMON_INDICATOR_PATH").map(PathBuf::from),
            link_interface: vars.string("DOORMON_LINK_INTERFACE"),
            supervisor: SupervisorConfig {
                attach_attempts: vars.count("DOORMON_ATTACH_ATTEMPTS", defaults.attach_attempts)?,
                attach_retry: vars.millis(
                    "DOORMON_ATTACH_RETRY_MS",
                    defaults.attach_retry.as_millis() as u64,
                )?,
                check_interval: vars.millis(
                    "DOORMON_LINK_CHECK_MS",
                    defaults.check_interval.as_millis() as u64,
                )?,
                lost_after: vars.count("DOORMON_LINK_LOST_AFTER", defaults.lost_after)?,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            store_key: StoreKey::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            trigger: TriggerSource::Signal,
            indicator_path: None,
            link_interface: None,
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Typed access to variables. Empty values count as unset.
struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn string(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, var: &'static str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.string(var).unwrap_or_else(|| default.to_string());
        match value.parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn positive(&self, var: &'static str, default: u64) -> Result<u64> {
        let n: u64 = self.parsed(var, &default.to_string())?;
        if n == 0 {
            return Err(ConfigError::Zero { var });
        }
        Ok(n)
    }

    fn millis(&self, var: &'static str, default: u64) -> Result<Duration> {
        self.positive(var, default).map(Duration::from_millis)
    }

    fn count(&self, var: &'static str, default: u32) -> Result<u32> {
        let n = self.positive(var, u64::from(default))?;
        u32::try_from(n).map_err(|e| ConfigError::Invalid {
            var,
            value: n.to_string(),
            reason: e.to_string(),
        })
    }
}
