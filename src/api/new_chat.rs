use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::SharedState;

/// `GET /api/new_chat`: forget the current session and its memory.
pub async fn new_chat(State(state): State<SharedState>) -> Json<Value> {
    state.context.lock().await.reset();
    tracing::info!("new chat session started");
    Json(json!({ "message": "New chat session started" }))
}
