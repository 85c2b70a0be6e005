use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::AppError;
use crate::registry::SourceDefinition;
use crate::routes::api::AppState;
use crate::scheduler::{BulkTrigger, ScheduledJob};

/// GET /api/v1/sources — enabled sources, priority order.
pub async fn list(State(state): State<AppState>) -> Json<Vec<SourceDefinition>> {
    let sources = state
        .pipeline
        .registry()
        .list_enabled()
        .into_iter()
        .cloned()
        .collect();
    Json(sources)
}

/// POST /api/v1/sources/{key}/ingest — enqueue a one-off run.
pub async fn trigger(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<ScheduledJob>), AppError> {
    let job = state.pipeline.trigger_ingestion(&key)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// POST /api/v1/ingest — fan out a manual trigger for every enabled source.
/// Responds once all runs are enqueued, not once they complete.
pub async fn trigger_all(State(state): State<AppState>) -> (StatusCode, Json<BulkTrigger>) {
    let report = state.pipeline.trigger_all_sources();
    (StatusCode::ACCEPTED, Json(report))
}
