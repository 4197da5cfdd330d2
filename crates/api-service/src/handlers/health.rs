//! Liveness handler.

use crate::models::HealthResponse;
use axum::Json;

/// Handler for GET /health
///
/// Does not check dependencies; a failure means the process is hung.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
