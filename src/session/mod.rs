//! Chat session persistence and the process-wide session context.
//!
//! A session is a JSON array in `prev_msgs/session_<n>.json`. Record 0 is a
//! `{"title": ...}` object once the first exchange completes; every later
//! record is a `{"query": ..., "response": ...}` pair.

pub mod context;
pub mod store;
pub mod title;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One entry of a session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionRecord {
    Title { title: String },
    Exchange { query: String, response: String },
}

impl SessionRecord {
    pub fn title(title: impl Into<String>) -> Self {
        Self::Title {
            title: title.into(),
        }
    }

    pub fn exchange(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Exchange {
            query: query.into(),
            response: response.into(),
        }
    }

    pub fn as_title(&self) -> Option<&str> {
        match self {
            Self::Title { title } => Some(title),
            Self::Exchange { .. } => None,
        }
    }
}

/// A titled session as shown in the history list. Serializes as `[title, filename]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEntry(pub String, pub String);

impl SessionEntry {
    pub fn title(&self) -> &str {
        &self.0
    }

    pub fn filename(&self) -> &str {
        &self.1
    }
}

/// A session read back from disk.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub path: PathBuf,
    pub records: Vec<SessionRecord>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed session file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
