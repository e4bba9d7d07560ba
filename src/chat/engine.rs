//! Retrieval-augmented chat engine ("condense plus context").
//!
//! For each question the engine:
//! 1. condenses it with the chat history into a standalone question (skipped
//!    when there is no history),
//! 2. retrieves the most similar chunks from the [`DocumentIndex`],
//! 3. streams a chat whose system message is the context prompt filled with
//!    those chunks, followed by the history and the original question.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use super::memory::ChatMemory;
use crate::index::search::RetrievedChunk;
use crate::index::DocumentIndex;
use crate::inference::{ChatMessage, LanguageModel, Role, TokenStream};

const CONDENSE_PROMPT: &str = "Given the following conversation between a user and an AI assistant \
and a follow up question from user, rephrase the follow up question to be a standalone question.\n\n\
Chat History:\n{chat_history}\n\
Follow Up Input: {question}\n\
Standalone question:";

#[derive(Clone)]
pub struct ChatEngine {
    llm: Arc<dyn LanguageModel>,
    index: Arc<DocumentIndex>,
    context_prompt: String,
}

impl ChatEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        index: Arc<DocumentIndex>,
        context_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            index,
            context_prompt: context_prompt.into(),
        }
    }

    /// Start a streamed answer to `question` given the prior `history`
    /// (which must not already contain `question`).
    pub async fn stream_chat(&self, question: &str, history: &[ChatMessage]) -> Result<TokenStream> {
        let standalone = self.condense(question, history).await?;
        let chunks = self
            .index
            .retrieve(&standalone)
            .await
            .context("document retrieval failed")?;
        debug!(
            question = %standalone,
            retrieved = chunks.len(),
            "retrieved context for chat"
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(&chunks)));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(question));

        self.llm
            .stream_chat(&messages)
            .await
            .context("chat stream failed to start")
    }

    /// Record the finished answer in `memory`.
    pub fn record_response(&self, memory: &mut ChatMemory, response: &str) {
        memory.put(ChatMessage::assistant(response));
    }

    async fn condense(&self, question: &str, history: &[ChatMessage]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let prompt = CONDENSE_PROMPT
            .replace("{chat_history}", &render_history(history))
            .replace("{question}", question);
        let condensed = self
            .llm
            .complete(&prompt)
            .await
            .context("failed to condense question")?;
        let condensed = condensed.trim();
        Ok(if condensed.is_empty() {
            question.to_string()
        } else {
            condensed.to_string()
        })
    }

    fn system_prompt(&self, chunks: &[RetrievedChunk]) -> String {
        let context = chunks
            .iter()
            .map(|c| format!("file_name: {}\n\n{}", c.file_name, c.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        self.context_prompt.replace("{context_str}", &context)
    }
}

fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
