use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// GET /health - service status and uptime.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = Utc::now() - state.startup_time;

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime.num_seconds().max(0),
    }))
}
