//! Session history listing and switching.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, SharedState};
use crate::session::{SessionEntry, SessionRecord};

#[derive(Debug, Deserialize)]
pub struct ChooseRequest {
    pub filename: Option<String>,
}

/// `GET /api/history`
pub async fn list(State(state): State<SharedState>) -> Result<Json<Vec<SessionEntry>>, ApiError> {
    Ok(Json(state.sessions.list_sessions()?))
}

/// `POST /api/choose_chat_history`: make a saved session current and return its records.
pub async fn choose(
    State(state): State<SharedState>,
    payload: Result<Json<ChooseRequest>, JsonRejection>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let Json(request) = payload?;
    let filename = request
        .filename
        .ok_or_else(|| ApiError::BadRequest("Filename parameter missing".into()))?;

    let session = state.sessions.load_session(&filename)?;
    if session.records.is_empty() {
        return Err(ApiError::NotFound("Session not found".into()));
    }

    let mut ctx = state.context.lock().await;
    ctx.activate(session.path.clone(), &session.records);
    info!(
        session = %filename,
        messages = ctx.memory().len(),
        "switched chat session"
    );

    Ok(Json(session.records))
}
