use axum::{Json, Router, routing::get};

use crate::HealthResponse;
use crate::state::AppState;

pub const HEALTH_SERVER_NAME: &str = "k-beauty-remote-mcp";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
}

/// Liveness probe. Touches no session state.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        server: HEALTH_SERVER_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
