//! Vector-store-backed document index.
//!
//! Documents are chunked, embedded through an [`EmbeddingProvider`] and stored
//! in SQLite with the [sqlite-vec](https://github.com/asg017/sqlite-vec)
//! extension for cosine nearest-neighbour search. The index only grows:
//! there is no update or delete path.

pub mod chunk;
pub mod reader;
pub mod schema;
pub mod search;
pub mod store;

use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;

use crate::config::RetrievalConfig;
use crate::inference::EmbeddingProvider;
use reader::Document;
use search::RetrievedChunk;
use store::{EmbeddedChunk, StoredDocument};

/// Chunks sent to the embedding service per request.
const EMBED_BATCH_SIZE: usize = 16;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Convert an f32 embedding to the little-endian blob sqlite-vec expects.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Summary of one ingestion call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents: Vec<StoredDocument>,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: Option<String>,
    pub embedding_dim: usize,
}

pub struct DocumentIndex {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    dim: usize,
}

impl DocumentIndex {
    /// Open (or create) the index database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        load_sqlite_vec();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open index at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let index = Self::from_connection(conn, embedder, config)?;
        tracing::info!(path = %path.display(), "document index ready");
        Ok(index)
    }

    /// Open a throwaway in-memory index.
    pub fn open_in_memory(
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        load_sqlite_vec();
        let conn = Connection::open_in_memory().context("failed to open in-memory index")?;
        Self::from_connection(conn, embedder, config)
    }

    fn from_connection(
        conn: Connection,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let dim = config.embedding_dim;
        if let Some(stored) = schema::get_meta(&conn, "embedding_dim").ok().flatten() {
            anyhow::ensure!(
                stored == dim.to_string(),
                "index was built with {stored}-dimensional embeddings, config says {dim}"
            );
        }
        schema::init_schema(&conn, dim).context("failed to initialize index schema")?;
        schema::set_meta(&conn, "embedding_dim", &dim.to_string())?;

        let model = embedder.embedding_model().to_string();
        match schema::get_meta(&conn, "embedding_model")? {
            Some(stored) if stored != model => tracing::warn!(
                stored = %stored,
                configured = %model,
                "embedding model changed; existing chunks were embedded with another model"
            ),
            Some(_) => {}
            None => schema::set_meta(&conn, "embedding_model", &model)?,
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            top_k: config.similarity_top_k,
            dim,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Chunk, embed and store `documents`.
    pub async fn add_documents(&self, documents: &[Document]) -> Result<IngestReport> {
        self.add_documents_with(documents, |_| {}).await
    }

    /// Like [`add_documents`](Self::add_documents), calling `on_document` with
    /// the chunk count after each document is stored.
    pub async fn add_documents_with(
        &self,
        documents: &[Document],
        mut on_document: impl FnMut(usize) + Send,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for doc in documents {
            let pieces = chunk::split_text(&doc.text, self.chunk_size, self.chunk_overlap);
            if pieces.is_empty() {
                on_document(0);
                continue;
            }

            let mut chunks = Vec::with_capacity(pieces.len());
            for batch in pieces.chunks(EMBED_BATCH_SIZE) {
                let embeddings = self
                    .embedder
                    .embed_batch(batch)
                    .await
                    .with_context(|| format!("embedding failed for {}", doc.file_name))?;
                chunks.extend(batch.iter().zip(embeddings).map(|(content, embedding)| {
                    EmbeddedChunk {
                        content: content.clone(),
                        embedding,
                    }
                }));
            }

            let conn = Arc::clone(&self.conn);
            let file_name = doc.file_name.clone();
            let dim = self.dim;
            let stored = tokio::task::spawn_blocking(move || {
                let mut conn = conn
                    .lock()
                    .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
                store::insert_document(&mut conn, &file_name, &chunks, dim)
            })
            .await
            .context("index write task failed")??;

            tracing::debug!(file = %stored.file_name, chunks = stored.chunk_count, "document indexed");
            report.chunks += stored.chunk_count;
            on_document(stored.chunk_count);
            report.documents.push(stored);
        }

        Ok(report)
    }

    /// The configured number of chunks most similar to `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("failed to embed query")?;

        let conn = Arc::clone(&self.conn);
        let k = self.top_k;
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
            search::nearest_chunks(&conn, &embedding, k)
        })
        .await
        .context("index search task failed")?
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let conn = Arc::clone(&self.conn);
        let dim = self.dim;
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
            Ok::<_, anyhow::Error>(IndexStats {
                documents: store::count_documents(&conn)?,
                chunks: store::count_chunks(&conn)?,
                embedding_model: schema::get_meta(&conn, "embedding_model")?,
                embedding_dim: dim,
            })
        })
        .await
        .context("index stats task failed")?
    }
}
