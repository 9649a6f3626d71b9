// HTTP routes that sit next to the websocket endpoints.

use crate::interface_adapters::protocol::SessionStatusDto;
use crate::interface_adapters::state::AppState;
use axum::{Json, extract::State};
use std::sync::Arc;

// Connectivity snapshot so operators (and the UI) can see whether the relay is usable.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<SessionStatusDto> {
    Json(state.session.status().await.into())
}
