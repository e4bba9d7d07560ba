#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::stream::{self, StreamExt};
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

use tichat::api::{self, AppState, SharedState};
use tichat::config::{RetrievalConfig, DEFAULT_CONTEXT_PROMPT};
use tichat::index::DocumentIndex;
use tichat::inference::{ChatMessage, EmbeddingProvider, InferenceError, LanguageModel, TokenStream};
use tichat::session::store::SessionStore;

pub const TEST_DIM: usize = 64;
pub const TEST_TITLE: &str = "Questions About X";
pub const CONDENSED: &str = "standalone question";

/// Scripted language model. Streams `fragments`, answers title prompts with
/// a quoted title and every other completion with [`CONDENSED`].
pub struct FakeModel {
    fragments: Vec<String>,
    title_output: String,
    fail_after: Option<usize>,
    gate: Option<Arc<Notify>>,
    pub chats: Mutex<Vec<Vec<ChatMessage>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            title_output: format!("Sure! \"{TEST_TITLE}\""),
            fail_after: None,
            gate: None,
            chats: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Emit `n` fragments, then fail.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Hold the last fragment back until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_title_output(mut self, output: &str) -> Self {
        self.title_output = output.to_string();
        self
    }

    pub fn last_chat(&self) -> Vec<ChatMessage> {
        self.chats.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("Generate a short and crisp title") {
            Ok(self.title_output.clone())
        } else {
            Ok(CONDENSED.to_string())
        }
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, InferenceError> {
        self.chats.lock().unwrap().push(messages.to_vec());

        let mut items: Vec<Result<String, InferenceError>> = Vec::new();
        match self.fail_after {
            Some(n) => {
                items.extend(self.fragments.iter().take(n).cloned().map(Ok));
                items.push(Err(InferenceError::Api("model crashed".into())));
            }
            None => items.extend(self.fragments.iter().cloned().map(Ok)),
        }

        let Some(gate) = self.gate.clone() else {
            return Ok(stream::iter(items).boxed());
        };
        let last = items.pop();
        let held = stream::once(async move {
            gate.notified().await;
            last
        })
        .filter_map(|item| async move { item });
        Ok(stream::iter(items).chain(held).boxed())
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

/// Deterministic bag-of-words embedder: each word bumps one of
/// [`TEST_DIM`] buckets. Never returns a zero vector.
pub struct FakeEmbedder;

pub fn fake_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.01f32; TEST_DIM];
    for word in text.split_whitespace() {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        v[(hasher.finish() % TEST_DIM as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        Ok(texts.iter().map(|t| fake_embedding(t)).collect())
    }

    fn embedding_model(&self) -> &str {
        "fake-embed"
    }
}

pub fn test_retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        chunk_size: 64,
        chunk_overlap: 8,
        similarity_top_k: 3,
        embedding_dim: TEST_DIM,
        context_prompt: DEFAULT_CONTEXT_PROMPT.to_string(),
    }
}

pub fn test_index() -> Arc<DocumentIndex> {
    Arc::new(DocumentIndex::open_in_memory(Arc::new(FakeEmbedder), &test_retrieval_config()).unwrap())
}

/// App state over a temp session directory.
pub fn test_state(
    tmp: &TempDir,
    llm: Option<Arc<FakeModel>>,
    index: Option<Arc<DocumentIndex>>,
) -> SharedState {
    let sessions = SessionStore::open(tmp.path().join("prev_msgs")).unwrap();
    let llm = llm.map(|m| m as Arc<dyn LanguageModel>);
    Arc::new(AppState::new(
        sessions,
        llm,
        index,
        DEFAULT_CONTEXT_PROMPT,
        4096,
    ))
}

/// Send one request through a fresh router; returns status and full body.
pub async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = api::router(Arc::clone(state), None)
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

pub async fn get(state: &SharedState, uri: &str) -> (StatusCode, Vec<u8>) {
    send(state, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(
    state: &SharedState,
    uri: &str,
    json: serde_json::Value,
) -> (StatusCode, Vec<u8>) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    send(state, request).await
}

pub fn json_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

pub const BOUNDARY: &str = "tichat-test-boundary";

/// Build a multipart/form-data body from `(field, filename, contents)` parts.
pub fn multipart_body(parts: &[(&str, &str, &str)]) -> Body {
    let mut body = String::new();
    for (field, filename, contents) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        body.push_str(&format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        ));
        body.push_str("Content-Type: text/plain\r\n\r\n");
        body.push_str(contents);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

pub async fn post_multipart(state: &SharedState, parts: &[(&str, &str, &str)]) -> (StatusCode, Vec<u8>) {
    let request = Request::post("/api/add_new_documents")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body(parts))
        .unwrap();
    send(state, request).await
}
