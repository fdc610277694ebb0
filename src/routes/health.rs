use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    // Bounded so the healthcheck answers even when the first connection hangs.
    let ledger_ok = match tokio::time::timeout(Duration::from_secs(3), state.ledger.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Health check ledger ping failed");
            false
        }
        Err(_) => {
            tracing::error!("Health check ledger ping timed out (3s)");
            false
        }
    };

    let status = if ledger_ok { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "now": Utc::now().to_rfc3339(),
        "ledger": state.ledger.backend_name(),
        "ledger_ok": ledger_ok,
        "finance_timezone": state.config.finance_timezone.name(),
    }))
}
