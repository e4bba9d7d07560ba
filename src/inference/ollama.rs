//! Ollama API client for local LLM inference and embeddings.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, EmbeddingProvider, InferenceError, LanguageModel, TokenStream};
use crate::config::InferenceConfig;

/// Ollama API client.
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// One line of a streaming `/api/chat` response.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

/// Progress line from the `/api/pull` stream.
#[derive(Debug, Clone, Deserialize)]
pub struct PullStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_connect() {
            InferenceError::ServerNotRunning(self.base_url.clone())
        } else {
            InferenceError::Http(e)
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        model: &str,
    ) -> Result<reqwest::Response, InferenceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND && text.contains("not found") {
            return Err(InferenceError::ModelNotFound(model.to_string()));
        }
        Err(InferenceError::Api(format!("{status}: {text}")))
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|_| InferenceError::ServerNotRunning(self.base_url.clone()))?;

        if !response.status().is_success() {
            return Err(InferenceError::ServerNotRunning(self.base_url.clone()));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check that the server is reachable and both configured models are installed.
    pub async fn check_availability(&self) -> Result<(), InferenceError> {
        let installed = self.list_models().await?;
        for wanted in [&self.model, &self.embed_model] {
            if !model_installed(&installed, wanted) {
                return Err(InferenceError::ModelNotFound(wanted.clone()));
            }
        }
        Ok(())
    }

    /// Pull `model` onto the server, reporting each progress line to `on_progress`.
    pub async fn pull(
        &self,
        model: &str,
        mut on_progress: impl FnMut(&PullStatus),
    ) -> Result<(), InferenceError> {
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&PullRequest {
                model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response, model).await?;

        let mut lines = NdjsonLines::new(response.bytes_stream().boxed());
        while let Some(status) = lines.next_json::<PullStatus>().await? {
            if let Some(error) = status.error {
                return Err(InferenceError::Api(error));
            }
            on_progress(&status);
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response, &self.model).await?;

        let response: GenerateResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(InferenceError::Api(error));
        }

        Ok(response.response)
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, InferenceError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        debug!(model = %self.model, messages = messages.len(), "starting chat stream");

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response, &self.model).await?;

        let lines = NdjsonLines::new(response.bytes_stream().boxed());
        let fragments = stream::try_unfold(lines, |mut lines| async move {
            while let Some(line) = lines.next_line().await? {
                let (text, done) = parse_chat_line(&line)?;
                if done {
                    lines.finish();
                }
                if !text.is_empty() {
                    return Ok(Some((text, lines)));
                }
                if done {
                    break;
                }
            }
            Ok(None)
        });

        Ok(fragments.boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(self.url("/api/embed"))
            .timeout(self.request_timeout)
            .json(&EmbedRequest {
                model: &self.embed_model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response, &self.embed_model).await?;

        let response: EmbedResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(InferenceError::Api(error));
        }
        if response.embeddings.len() != texts.len() {
            return Err(InferenceError::Api(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }

    fn embedding_model(&self) -> &str {
        &self.embed_model
    }
}

/// `true` if `wanted` (with or without a tag) is among the installed names.
pub fn model_installed(installed: &[String], wanted: &str) -> bool {
    let base = wanted.split(':').next().unwrap_or(wanted);
    installed.iter().any(|name| {
        name == wanted
            || (!wanted.contains(':') && name.starts_with(&format!("{base}:")))
    })
}

/// Decode one `/api/chat` line into its text delta and `done` flag.
fn parse_chat_line(line: &[u8]) -> Result<(String, bool), InferenceError> {
    let chunk: ChatChunk = serde_json::from_slice(line)?;
    if let Some(error) = chunk.error {
        return Err(InferenceError::Api(error));
    }
    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok((text, chunk.done))
}

/// Splits a streamed HTTP body into newline-delimited JSON lines.
struct NdjsonLines<S> {
    inner: S,
    buf: Vec<u8>,
    eof: bool,
}

impl<S, B, E> NdjsonLines<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    InferenceError: From<E>,
{
    fn new(inner: S) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Stop yielding lines, even if the body has more data.
    fn finish(&mut self) {
        self.eof = true;
        self.buf.clear();
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, InferenceError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(line));
            }
            if self.eof {
                let rest = std::mem::take(&mut self.buf);
                if rest.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Ok(Some(rest));
            }
            match self.inner.next().await {
                Some(chunk) => self.buf.extend_from_slice(chunk?.as_ref()),
                None => self.eof = true,
            }
        }
    }

    async fn next_json<T: DeserializeOwned>(&mut self) -> Result<Option<T>, InferenceError> {
        match self.next_line().await? {
            Some(line) => Ok(Some(serde_json::from_slice(&line)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> NdjsonLines<stream::Iter<std::vec::IntoIter<Result<&'static [u8], InferenceError>>>> {
        let items: Vec<Result<&'static [u8], InferenceError>> =
            parts.iter().map(|p| Ok(p.as_bytes())).collect();
        NdjsonLines::new(stream::iter(items))
    }

    #[test]
    fn client_trims_trailing_slash() {
        let config = InferenceConfig {
            base_url: "http://localhost:11434/".into(),
            ..InferenceConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model_name(), "mistral:instruct");
        assert_eq!(client.embedding_model(), "mxbai-embed-large");
    }

    #[test]
    fn parse_chat_line_extracts_delta() {
        let (text, done) =
            parse_chat_line(br#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#)
                .unwrap();
        assert_eq!(text, "Hel");
        assert!(!done);

        let (text, done) = parse_chat_line(br#"{"message":{"role":"assistant","content":""},"done":true}"#).unwrap();
        assert!(text.is_empty());
        assert!(done);
    }

    #[test]
    fn parse_chat_line_surfaces_errors() {
        let err = parse_chat_line(br#"{"error":"model crashed"}"#).unwrap_err();
        assert!(matches!(err, InferenceError::Api(ref m) if m == "model crashed"));
        assert!(parse_chat_line(b"not json").is_err());
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let mut lines = body(&["{\"a\":", "1}\n\n{\"a\"", ":2}\n", "{\"a\":3}"]);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"{\"a\":1}");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"{\"a\":2}");
        // final line without trailing newline
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"{\"a\":3}");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finish_stops_reading() {
        let mut lines = body(&["one\ntwo\n"]);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"one");
        lines.finish();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[test]
    fn model_installed_matches_tags() {
        let installed = vec!["mistral:instruct".to_string(), "mxbai-embed-large:latest".to_string()];
        assert!(model_installed(&installed, "mistral:instruct"));
        assert!(model_installed(&installed, "mxbai-embed-large"));
        assert!(!model_installed(&installed, "mistral:7b"));
        assert!(!model_installed(&installed, "llama3"));

        let latest = vec!["mistral:latest".to_string()];
        assert!(model_installed(&latest, "mistral"));
        assert!(!model_installed(&latest, "mistral:instruct"));
    }
}
