use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::fetchers::ChatMessage;
use crate::routes::api::AppState;
use crate::scheduler::InboundDispatch;

/// POST /api/v1/inbound — delivery endpoint for the chat collaborator.
/// Messages from channels outside a source's allow-list are ignored, not
/// rejected, so the collaborator never needs to know the list.
pub async fn receive(
    State(state): State<AppState>,
    Json(message): Json<ChatMessage>,
) -> (StatusCode, Json<InboundDispatch>) {
    let dispatch = state.pipeline.dispatch_inbound(message);
    (StatusCode::ACCEPTED, Json(dispatch))
}
