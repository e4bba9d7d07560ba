//! Nearest-neighbour chunk lookup via sqlite-vec.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::embedding_to_bytes;

/// A chunk returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub file_name: String,
    pub content: String,
    /// Cosine similarity, `1 - distance`.
    pub score: f64,
}

/// The `k` chunks closest to `embedding`, best first.
pub fn nearest_chunks(conn: &Connection, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
    if k == 0 {
        return Ok(vec![]);
    }

    let mut stmt = conn.prepare(
        "SELECT chunk_id, distance FROM chunks_vec \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(params![embedding_to_bytes(embedding), k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lookup = conn.prepare(
        "SELECT c.content, d.file_name FROM chunks c \
         JOIN documents d ON d.id = c.document_id WHERE c.id = ?1",
    )?;

    let mut results = Vec::with_capacity(hits.len());
    for (chunk_id, distance) in hits {
        let row = lookup
            .query_row([&chunk_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;
        if let Some((content, file_name)) = row {
            results.push(RetrievedChunk {
                chunk_id,
                file_name,
                content,
                score: 1.0 - distance,
            });
        }
    }
    Ok(results)
}
