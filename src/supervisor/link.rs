//! Network link probes.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors returned by a link probe.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link reported a state other than up.
    #[error("link {interface} is {state}")]
    Down { interface: String, state: String },

    /// The link state could not be read.
    #[error("failed to read link state from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A network attachment whose readiness gates the HTTP surface.
pub trait Link: Send + Sync {
    /// Checks whether the link is usable right now.
    fn probe(&self) -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// A link that is always up, for hosts whose network is managed elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysUp;

impl Link for AlwaysUp {
    async fn probe(&self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// A Linux network interface, up when its `operstate` reads `up`.
#[derive(Debug, Clone)]
pub struct InterfaceLink {
    interface: String,
    operstate: PathBuf,
}

impl InterfaceLink {
    /// Probes `interface` under the real `/sys`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_sys_root(interface, "/sys")
    }

    /// Probes `interface` under an alternative sysfs root.
    pub fn with_sys_root(interface: impl Into<String>, sys_root: impl AsRef<Path>) -> Self {
        let interface = interface.into();
        let operstate = sys_root
            .as_ref()
            .join("class/net")
            .join(&interface)
            .join("operstate");
        InterfaceLink {
            interface,
            operstate,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Link for InterfaceLink {
    async fn probe(&self) -> Result<(), LinkError> {
        let state = tokio::fs::read_to_string(&self.operstate)
            .await
            .map_err(|source| LinkError::Io {
                path: self.operstate.clone(),
                source,
            })?;

        match state.trim() {
            "up" => Ok(()),
            other => Err(LinkError::Down {
                interface: self.interface.clone(),
                state: other.to_string(),
            }),
        }
    }
}
