//! Bounded conversational history.

use crate::inference::{ChatMessage, Role};
use crate::session::SessionRecord;

use super::estimate_tokens;

/// Ordered role-tagged messages, read back through a token budget.
///
/// Every message is kept; [`ChatMemory::get`] returns the most recent suffix
/// that fits within `token_limit`.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    messages: Vec<ChatMessage>,
    token_limit: usize,
}

impl ChatMemory {
    pub fn new(token_limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            token_limit,
        }
    }

    /// Rebuild a memory by replaying every query/response pair of a session.
    /// Title records are skipped.
    pub fn from_records(records: &[SessionRecord], token_limit: usize) -> Self {
        let mut memory = Self::new(token_limit);
        for record in records {
            if let SessionRecord::Exchange { query, response } = record {
                memory.put(ChatMessage::user(query.as_str()));
                memory.put(ChatMessage::assistant(response.as_str()));
            }
        }
        memory
    }

    pub fn put(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn get_all(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Most recent messages whose estimated size fits the token budget.
    ///
    /// The newest message is always included, even when it alone exceeds the
    /// budget. Leading assistant messages are dropped unless only one is left.
    pub fn get(&self) -> Vec<ChatMessage> {
        let len = self.messages.len();
        let mut used = 0usize;
        let mut start = len;
        while start > 0 {
            let tokens = estimate_tokens(&self.messages[start - 1].content);
            if start < len && used + tokens > self.token_limit {
                break;
            }
            used += tokens;
            start -= 1;
        }
        while start + 1 < len && self.messages[start].role == Role::Assistant {
            start += 1;
        }
        self.messages[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }
}
