//! Status endpoint.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::AppState;

/// Body of a `GET /status` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub triggered: bool,
}

/// Status handler.
///
/// Reports the latch value. Never mutates state and never fails.
///
/// # Example
///
/// ```ignore
/// GET /status HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"triggered":false}
/// ```
pub async fn status_handler(State(app_state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        triggered: app_state.latch().read(),
    })
}
