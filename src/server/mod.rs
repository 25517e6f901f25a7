//! HTTP surface for the latch.
//!
//! # Endpoints
//!
//! - `GET /status` - Returns `{"triggered": <bool>}`
//! - `GET /reset`, `POST /reset` - Clears the latch, returns `{"reset": true}`
//! - `GET /health` - Returns 200 if the server is running
//!
//! The router is only bound once the connectivity supervisor reports the
//! link as ready; see [`crate::daemon::run`].

use std::sync::Arc;

use axum::routing::get;

use crate::indicator::IndicatorFeed;
use crate::latch::Latch;

pub mod health;
pub mod reset;
pub mod status;

pub use health::health_handler;
pub use reset::{ResetBody, reset_handler};
pub use status::{StatusBody, status_handler};

/// Shared application state.
///
/// Passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    latch: Arc<Latch>,
    indicator: IndicatorFeed,
}

impl AppState {
    pub fn new(latch: Arc<Latch>, indicator: IndicatorFeed) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { latch, indicator }),
        }
    }

    /// Returns the process latch.
    pub fn latch(&self) -> &Arc<Latch> {
        &self.inner.latch
    }

    /// Returns the feed republished after a reset.
    pub fn indicator(&self) -> &IndicatorFeed {
        &self.inner.indicator
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/status", get(status_handler))
        .route("/reset", get(reset_handler).post(reset_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
