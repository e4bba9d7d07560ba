//! HTTP surface: query streaming, session history, document upload and
//! new-chat reset, plus the bundled web UI.

pub mod documents;
pub mod history;
pub mod new_chat;
pub mod query;

use std::path::Path;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::engine::ChatEngine;
use crate::index::DocumentIndex;
use crate::inference::LanguageModel;
use crate::session::context::ChatContext;
use crate::session::store::SessionStore;
use crate::session::SessionError;

/// Upload cap for `/api/add_new_documents`.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Everything the handlers share. Backends that failed to initialize at
/// startup are `None` and surface as 500s on use.
pub struct AppState {
    pub sessions: SessionStore,
    pub llm: Option<Arc<dyn LanguageModel>>,
    pub index: Option<Arc<DocumentIndex>>,
    pub engine: Option<ChatEngine>,
    pub context: Mutex<ChatContext>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        sessions: SessionStore,
        llm: Option<Arc<dyn LanguageModel>>,
        index: Option<Arc<DocumentIndex>>,
        context_prompt: &str,
        token_limit: usize,
    ) -> Self {
        let engine = match (&llm, &index) {
            (Some(llm), Some(index)) => Some(ChatEngine::new(
                Arc::clone(llm),
                Arc::clone(index),
                context_prompt,
            )),
            _ => None,
        };
        Self {
            sessions,
            llm,
            index,
            engine,
            context: Mutex::new(ChatContext::new(token_limit)),
        }
    }
}

/// Build the application router. `static_dir`, when given, is served for
/// every path outside `/api`.
pub fn router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/query", post(query::query))
        .route("/api/history", get(history::list))
        .route("/api/choose_chat_history", post(history::choose))
        .route(
            "/api/add_new_documents",
            post(documents::add_new_documents).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/new_chat", get(new_chat::new_chat))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Handler error, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Uninitialized(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Uninitialized(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(e) => tracing::error!(error = ?e, "request failed"),
            Self::Uninitialized(what) => tracing::error!(backend = what, "backend not initialized"),
            _ => tracing::debug!(status = %status, error = %self, "request rejected"),
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => Self::NotFound("Session not found".into()),
            other => Self::Internal(other.into()),
        }
    }
}
