//! Session title generation helpers.

use thiserror::Error;

/// Longest fallback title, in characters.
const FALLBACK_TITLE_CHARS: usize = 48;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TitleError {
    #[error("model output has no quoted title: {0:?}")]
    Unquoted(String),
    #[error("model output has an empty quoted title")]
    Empty,
}

/// Prompt asking the model for a quoted title for `query`.
pub fn title_prompt(query: &str) -> String {
    format!("`{query}`\n\nGenerate a short and crisp title pertaining to the above query, in quotes")
}

/// Text between the first pair of double quotes in `output`.
pub fn extract_title(output: &str) -> Result<String, TitleError> {
    let mut parts = output.trim().split('"');
    parts.next();
    match (parts.next(), parts.next()) {
        (Some(title), Some(_)) => {
            let title = title.trim();
            if title.is_empty() {
                Err(TitleError::Empty)
            } else {
                Ok(title.to_string())
            }
        }
        _ => Err(TitleError::Unquoted(output.trim().to_string())),
    }
}

/// Title derived from the query itself: its first line, shortened.
pub fn fallback_title(query: &str) -> String {
    let line = query.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("New chat");
    if line.chars().count() <= FALLBACK_TITLE_CHARS {
        return line.to_string();
    }
    let mut title: String = line.chars().take(FALLBACK_TITLE_CHARS).collect();
    title.push_str("...");
    title
}
