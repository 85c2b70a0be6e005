use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::error::AppError;
use crate::routes::api::AppState;
use crate::store::{
    ItemFilters, PersistedItem, STATUS_APPROVED, STATUS_PENDING, STATUS_REJECTED,
};

pub async fn list(
    State(state): State<AppState>,
    Query(filters): Query<ItemFilters>,
) -> Result<Json<Vec<PersistedItem>>, AppError> {
    let items = state.pipeline.store().list_items(&filters).await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemStatus {
    pub status: String,
}

/// PATCH /api/v1/items/{id} — status pass-through for the external reviewer
/// workflow; the pipeline itself never changes an item's status.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<UpdateItemStatus>,
) -> Result<Json<PersistedItem>, AppError> {
    if ![STATUS_PENDING, STATUS_APPROVED, STATUS_REJECTED].contains(&input.status.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Invalid status '{}'",
            input.status
        )));
    }
    let item = state
        .pipeline
        .store()
        .update_status(id, &input.status)
        .await?;
    Ok(Json(item))
}
