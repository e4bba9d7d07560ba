//! Conversation state: the bounded [`memory::ChatMemory`] buffer and the
//! retrieval-augmented [`engine::ChatEngine`].

pub mod engine;
pub mod memory;

/// Rough characters-per-token ratio used for every budget in the crate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}
