//! Whitespace-boundary text chunking with overlap.

use crate::chat::CHARS_PER_TOKEN;

/// Split `text` into chunks of at most `chunk_size` estimated tokens, each
/// repeating up to `overlap` tokens from the end of the previous chunk.
///
/// Whitespace runs collapse to single spaces. A single word longer than the
/// budget becomes its own oversized chunk.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let max_chars = chunk_size.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = overlap.min(chunk_size / 2) * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let mut end = start;
        let mut len = 0;
        while end < words.len() {
            let cost = words[end].len() + usize::from(end > start);
            if end > start && len + cost > max_chars {
                break;
            }
            len += cost;
            end += 1;
        }
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }

        // walk back from `end` to carry the overlap into the next chunk
        let mut next = end;
        let mut carried = 0;
        while next > start + 1 {
            let cost = words[next - 1].len() + 1;
            if carried + cost > overlap_chars {
                break;
            }
            carried += cost;
            next -= 1;
        }
        start = next;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_text("", 512, 50).is_empty());
        assert!(split_text(" \n\t ", 512, 50).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("hello   brave\nnew world", 512, 50), vec!["hello brave new world"]);
    }

    #[test]
    fn chunks_respect_budget_and_overlap() {
        // 4 tokens = 16 chars per chunk, 2 tokens = 8 chars overlap
        let text = "aaa bbb ccc ddd eee fff ggg";
        let chunks = split_text(text, 4, 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 16, "chunk too long: {chunk:?}");
        }
        assert_eq!(chunks[0], "aaa bbb ccc ddd");
        // the next chunk starts with the tail of the previous one
        assert!(chunks[1].starts_with("ccc ddd"));
        assert!(chunks.last().unwrap().ends_with("ggg"));
    }

    #[test]
    fn oversized_word_still_progresses() {
        let text = format!("{} tail", "x".repeat(100));
        let chunks = split_text(&text, 4, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "tail");
    }
}
