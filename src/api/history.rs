use crate::error::{ApiError, ApiResult};
use crate::store::{AnalysisRecords, HistoryPage};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    pub unit: Option<String>,
}

/// GET /api/analyses/:id - everything stored under one analysis, optionally
/// narrowed to a single unit.
pub async fn fetch(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
    Query(params): Query<FetchParams>,
) -> ApiResult<Json<AnalysisRecords>> {
    let records = state
        .archive
        .fetch(analysis_id, params.unit.as_deref())
        .await?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /api/history - analyses by recency, newest first, paginated.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<HistoryPage>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);

    let page = state.archive.list_recent(limit, offset).await?;
    Ok(Json(page))
}

/// DELETE /api/history/:id - remove an analysis and every record under it.
pub async fn remove(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let deleted = state.archive.delete(analysis_id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!(
            "no analysis with id {}",
            analysis_id
        )));
    }
    Ok(Json(json!({ "deleted_count": deleted })))
}
