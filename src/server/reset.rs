//! Reset endpoint.
//!
//! Reset always reports success. The in-memory latch is cleared before the
//! handler returns; if the synchronous persist fails, the latch stays dirty
//! and the flusher commits the cleared value on its next wake.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::AppState;

/// Body of a `/reset` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetBody {
    pub reset: bool,
}

/// Reset handler, mounted for both GET and POST.
///
/// # Example
///
/// ```ignore
/// POST /reset HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"reset":true}
/// ```
pub async fn reset_handler(State(app_state): State<AppState>) -> Json<ResetBody> {
    let latch = Arc::clone(app_state.latch());
    let was_triggered = latch.read();

    match tokio::task::spawn_blocking(move || latch.reset()).await {
        Ok(Ok(())) => debug!("Reset persisted"),
        Ok(Err(e)) => warn!(error = %e, "Reset not persisted, deferred to flusher"),
        Err(e) => error!(error = %e, "Reset task failed"),
    }

    if was_triggered {
        info!("Trigger reset");
    }
    app_state.indicator().publish(app_state.latch().read());

    Json(ResetBody { reset: true })
}
