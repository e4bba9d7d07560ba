//! `POST /api/query`: stream an answer and persist the finished exchange.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ApiError, SharedState};
use crate::inference::{ChatMessage, TokenStream};
use crate::session::title::{extract_title, fallback_title, title_prompt};
use crate::session::SessionRecord;

/// Appended to the body when generation or persistence fails mid-stream.
pub const STREAM_ERROR_MARKER: &str = "[ERROR] Something went wrong. Please try again later.";

const STREAM_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: Option<String>,
    #[serde(rename = "useQueryEngine", default)]
    pub use_query_engine: bool,
}

/// Session the turn writes to, fixed when the turn starts.
#[derive(Debug, Clone)]
enum Target {
    New,
    Existing(PathBuf),
}

struct Turn {
    state: SharedState,
    query: String,
    retrieval: bool,
    target: Target,
    /// Context epoch when the turn started.
    epoch: u64,
}

pub async fn query(
    State(state): State<SharedState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let query = request
        .query
        .ok_or_else(|| ApiError::BadRequest("Query parameter missing".into()))?;
    let retrieval = request.use_query_engine;

    let (history, target, epoch) = {
        let mut ctx = state.context.lock().await;
        if retrieval {
            if state.engine.is_none() {
                return Err(ApiError::Uninitialized("Query engine not initialized"));
            }
        } else if state.llm.is_none() {
            return Err(ApiError::Uninitialized("LLM not initialized"));
        }

        let target = match ctx.current_session() {
            Some(path) => Target::Existing(path.to_path_buf()),
            None => Target::New,
        };

        // The engine condenses against prior turns only, so take its history
        // before the query goes in. Memory mode sends the whole conversation.
        let prior = retrieval.then(|| ctx.memory().get());
        ctx.memory_mut().put(ChatMessage::user(query.clone()));
        let history = prior.unwrap_or_else(|| ctx.memory().get_all().to_vec());
        (history, target, ctx.epoch())
    };

    let tokens = start_stream(&state, &query, &history, retrieval).await?;
    debug!(retrieval, new_session = matches!(target, Target::New), "streaming answer");

    let (tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let turn = Turn {
        state: Arc::clone(&state),
        query,
        retrieval,
        target,
        epoch,
    };
    tokio::spawn(turn.run(tokens, tx));

    let body = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn start_stream(
    state: &SharedState,
    query: &str,
    history: &[ChatMessage],
    retrieval: bool,
) -> Result<TokenStream, ApiError> {
    if retrieval {
        let engine = state
            .engine
            .as_ref()
            .ok_or(ApiError::Uninitialized("Query engine not initialized"))?;
        Ok(engine.stream_chat(query, history).await?)
    } else {
        let llm = state
            .llm
            .as_ref()
            .ok_or(ApiError::Uninitialized("LLM not initialized"))?;
        Ok(llm
            .stream_chat(history)
            .await
            .context("chat stream failed to start")?)
    }
}

impl Turn {
    /// Forward fragments to the client, then persist. Keeps going if the
    /// client disconnects.
    async fn run(self, mut tokens: TokenStream, tx: mpsc::Sender<String>) {
        let mut response = String::new();
        let mut failed = false;

        while let Some(item) = tokens.next().await {
            match item {
                Ok(fragment) => {
                    response.push_str(&fragment);
                    let _ = tx.send(fragment).await;
                }
                Err(e) => {
                    warn!(error = %e, "inference failed mid-stream");
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            if let Err(e) = self.finish(&response).await {
                warn!(error = ?e, "failed to record exchange");
                failed = true;
            }
        }

        if failed {
            let _ = tx.send(STREAM_ERROR_MARKER.to_string()).await;
        }
    }

    async fn finish(&self, response: &str) -> anyhow::Result<()> {
        let sessions = &self.state.sessions;

        let path = match &self.target {
            Target::Existing(path) => path.clone(),
            Target::New => {
                let title = self.generate_title().await?;
                let path = sessions.create_session()?;
                sessions.append(&path, &SessionRecord::title(&title))?;
                info!(session = %path.display(), title = %title, "session created");
                path
            }
        };
        sessions.append(&path, &SessionRecord::exchange(&self.query, response))?;

        let mut ctx = self.state.context.lock().await;
        let attached = match &self.target {
            Target::New => ctx.attach(path.clone(), self.epoch),
            Target::Existing(_) => {
                ctx.epoch() == self.epoch && ctx.current_session() == Some(path.as_path())
            }
        };
        if attached {
            match (&self.state.engine, self.retrieval) {
                (Some(engine), true) => engine.record_response(ctx.memory_mut(), response),
                _ => ctx.memory_mut().put(ChatMessage::assistant(response)),
            }
        } else {
            debug!(session = %path.display(), "context moved on; memory left untouched");
        }
        Ok(())
    }

    async fn generate_title(&self) -> anyhow::Result<String> {
        let llm = self
            .state
            .llm
            .as_ref()
            .context("LLM not initialized")?;
        let output = llm
            .complete(&title_prompt(&self.query))
            .await
            .context("title generation failed")?;
        Ok(match extract_title(&output) {
            Ok(title) => title,
            Err(e) => {
                warn!(error = %e, "using fallback session title");
                fallback_title(&self.query)
            }
        })
    }
}
