//! Write path: one document, its chunks and their vectors in a single transaction.

use anyhow::{ensure, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::embedding_to_bytes;

/// A chunk ready to be written, paired with its embedding.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Result of inserting one document.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub file_name: String,
    pub chunk_count: usize,
}

/// Insert a document row, its chunks, and the chunk vectors.
pub fn insert_document(
    conn: &mut Connection,
    file_name: &str,
    chunks: &[EmbeddedChunk],
    dim: usize,
) -> Result<StoredDocument> {
    for chunk in chunks {
        ensure!(
            chunk.embedding.len() == dim,
            "embedding has {} dimensions, index expects {dim}",
            chunk.embedding.len()
        );
    }

    let tx = conn.transaction()?;
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO documents (id, file_name, ingested_at, chunk_count) VALUES (?1, ?2, ?3, ?4)",
        params![id, file_name, now, chunks.len() as i64],
    )?;

    for (position, chunk) in chunks.iter().enumerate() {
        let chunk_id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO chunks (id, document_id, position, content) VALUES (?1, ?2, ?3, ?4)",
            params![chunk_id, id, position as i64, chunk.content],
        )?;
        tx.execute(
            "INSERT INTO chunks_vec (chunk_id, embedding) VALUES (?1, ?2)",
            params![chunk_id, embedding_to_bytes(&chunk.embedding)],
        )?;
    }

    tx.commit()?;

    Ok(StoredDocument {
        id,
        file_name: file_name.to_string(),
        chunk_count: chunks.len(),
    })
}

/// Number of stored chunks.
pub fn count_chunks(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
        .map(|n| n as usize)
}

/// Number of stored documents.
pub fn count_documents(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get::<_, i64>(0))
        .map(|n| n as usize)
}
