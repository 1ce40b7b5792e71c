mod analyze;
mod health;
mod history;
mod insights;
mod similar;

use crate::AppState;
use axum::routing::{delete, get, post};
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze", post(analyze::submit))
        .route("/api/analyses/:id", get(history::fetch))
        .route("/api/history", get(history::list))
        .route("/api/history/:id", delete(history::remove))
        .route("/api/similar", post(similar::find))
        .route("/api/insights", get(insights::get_insights))
        .route("/health", get(health::health))
}
