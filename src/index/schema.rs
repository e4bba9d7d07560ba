//! SQL DDL for the document index.
//!
//! Defines the `documents`, `chunks`, `chunks_vec` (vec0) and `index_meta`
//! tables. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    ingested_at TEXT NOT NULL,
    chunk_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual table; the dimension is fixed when the table is first created.
fn vec_table_sql(dim: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_vec USING vec0(\
         chunk_id TEXT PRIMARY KEY, \
         embedding FLOAT[{dim}] distance_metric=cosine);"
    )
}

pub fn init_schema(conn: &Connection, dim: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&vec_table_sql(dim))?;
    Ok(())
}

pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM index_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        super::super::load_sqlite_vec();
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn schema_creates_all_tables() {
        let conn = test_conn();
        init_schema(&conn, 8).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"chunks".to_string()));
        assert!(tables.contains(&"index_meta".to_string()));
        assert!(tables.contains(&"chunks_vec".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = test_conn();
        init_schema(&conn, 8).unwrap();
        init_schema(&conn, 8).unwrap();
    }

    #[test]
    fn meta_roundtrip() {
        let conn = test_conn();
        init_schema(&conn, 8).unwrap();
        assert_eq!(get_meta(&conn, "embedding_model").unwrap(), None);
        set_meta(&conn, "embedding_model", "mxbai-embed-large").unwrap();
        set_meta(&conn, "embedding_model", "nomic-embed-text").unwrap();
        assert_eq!(
            get_meta(&conn, "embedding_model").unwrap().as_deref(),
            Some("nomic-embed-text")
        );
    }
}
