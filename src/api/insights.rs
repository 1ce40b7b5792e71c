use crate::store::{gather_insights, Insights};
use crate::AppState;
use axum::extract::State;
use axum::Json;

/// GET /api/insights - historical aggregates. Each sub-aggregate degrades
/// independently, so this endpoint never fails as a whole.
pub async fn get_insights(State(state): State<AppState>) -> Json<Insights> {
    Json(gather_insights(state.archive.as_ref()).await)
}
