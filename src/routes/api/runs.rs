use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::error::AppError;
use crate::routes::api::AppState;
use crate::store::IngestRun;

#[derive(Debug, Deserialize)]
pub struct RunFilters {
    pub source: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(filters): Query<RunFilters>,
) -> Result<Json<Vec<IngestRun>>, AppError> {
    let limit = filters.limit.unwrap_or(50).clamp(1, 200);
    let runs = state
        .pipeline
        .store()
        .recent_runs(filters.source.as_deref(), limit)
        .await?;
    Ok(Json(runs))
}
