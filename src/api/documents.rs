//! `POST /api/add_new_documents`: multipart upload into the document index.

use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::{debug, info};

use super::{ApiError, SharedState};
use crate::index::reader;

const FILES_FIELD: &str = "files";

pub async fn add_new_documents(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|_| no_files())?;

    // Removed on drop, whichever way this handler exits.
    let staging = TempDir::new().context("failed to create staging directory")?;
    let mut saved = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let Some(name) = field.file_name().and_then(safe_file_name) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let dest = staging.path().join(&name);
        tokio::fs::write(&dest, &bytes)
            .await
            .with_context(|| format!("failed to stage {}", dest.display()))?;
        debug!(file = %name.display(), bytes = bytes.len(), "staged upload");
        saved += 1;
    }

    if saved == 0 {
        return Err(no_files());
    }

    let index = state
        .index
        .as_ref()
        .ok_or(ApiError::Uninitialized("Document index not initialized"))?;

    let dir = staging.path().to_path_buf();
    let documents = tokio::task::spawn_blocking(move || reader::read_directory(&dir))
        .await
        .context("document reader task failed")??;
    if documents.is_empty() {
        return Err(ApiError::BadRequest("No readable documents in upload".into()));
    }

    let report = index.add_documents(&documents).await?;
    info!(
        documents = report.documents.len(),
        chunks = report.chunks,
        "documents added to index"
    );

    Ok(Json(json!({ "success": "Documents added successfully" })))
}

fn no_files() -> ApiError {
    ApiError::BadRequest("No files provided".into())
}

/// Final path component of an uploaded file name, or `None` if nothing usable remains.
fn safe_file_name(name: &str) -> Option<PathBuf> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Path::new(base).file_name().map(PathBuf::from)
}
