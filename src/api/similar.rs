use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SimilarRequest {
    pub line: String,
    pub limit: Option<u32>,
    pub exclude_analysis_id: Option<Uuid>,
}

/// POST /api/similar - previously analyzed lines ranked by similarity. The
/// ranking method (full-text vs lexical fallback) is not surfaced.
pub async fn find(
    State(state): State<AppState>,
    Json(request): Json<SimilarRequest>,
) -> ApiResult<Json<Value>> {
    let line = request.line.trim();
    if line.is_empty() {
        return Err(ApiError::BadRequest(
            "line must be a non-empty string".to_string(),
        ));
    }

    let limit = request.limit.unwrap_or(5).clamp(1, 10);
    let similar = state
        .archive
        .find_similar(line, limit, request.exclude_analysis_id)
        .await?;

    Ok(Json(json!({ "similar": similar })))
}
