pub mod inbound;
pub mod items;
pub mod runs;
pub mod sources;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};

use crate::scheduler::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let api = Router::new()
        // Sources and triggers
        .route("/sources", get(sources::list))
        .route("/sources/{key}/ingest", post(sources::trigger))
        .route("/ingest", post(sources::trigger_all))
        // Inbound chat collaborator
        .route("/inbound", post(inbound::receive))
        // Review queue
        .route("/items", get(items::list))
        .route("/items/{id}", patch(items::update_status))
        // Audit trail
        .route("/runs", get(runs::list))
        .with_state(AppState { pipeline });

    Router::new().nest("/api/v1", api)
}
