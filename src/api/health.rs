use axum::extract::State;
use axum::Json;
use tracing::warn;

use super::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the ledger database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    sqlx::query("SELECT 1")
        .execute(state.repo.pool())
        .await
        .inspect_err(|e| warn!(error = %e, "Readiness probe failed"))?;

    Ok(Json(serde_json::json!({
        "status": "ready",
        "escrowMode": state.config.escrow_mode.as_str(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}
