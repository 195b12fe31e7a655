use axum::{extract::State, routing::get, Json, Router};
use sqlx::PgPool;
use axum::http::StatusCode;
use serde_json::json;

use crate::app_state::AppState;

/// Defines health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}

/// **Liveness Check**
/// Verifies that the API is running. Does not touch the database.
async fn liveness_check() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": "API is live" }))
}

/// **Readiness Check**
/// Returns `503` while the database or the workflow tables are unreachable.
async fn readiness_check(State(pool): State<PgPool>) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    sqlx::query("SELECT 1 FROM material_request_items LIMIT 1")
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": "Database unavailable", "details": e.to_string() })),
            )
        })?;

    Ok(Json(json!({ "success": true, "message": "API is ready" })))
}
