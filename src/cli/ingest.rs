//! CLI `ingest` command: add local files to the document index.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tichat::config::TichatConfig;
use tichat::index::reader::{self, Document};
use tichat::index::DocumentIndex;
use tichat::inference;
use tichat::settings::Settings;

pub async fn ingest(config: &TichatConfig, paths: &[PathBuf]) -> Result<()> {
    let mut documents: Vec<Document> = Vec::new();
    for path in paths {
        if path.is_dir() {
            documents.extend(reader::read_directory(path)?);
        } else {
            match reader::read_file(path)? {
                Some(doc) => documents.push(doc),
                None => println!("Skipping {}: no text found", path.display()),
            }
        }
    }

    if documents.is_empty() {
        println!("Nothing to ingest.");
        return Ok(());
    }

    let settings = Settings::load_or_create(config.settings_path())?;
    let index_path = settings
        .index_path()
        .unwrap_or_else(|| config.default_index_path());

    let client = Arc::new(inference::create_client(&config.inference)?);
    let index = DocumentIndex::open(&index_path, client, &config.retrieval)
        .context("failed to open document index")?;

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} documents ({eta})")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );

    let report = index
        .add_documents_with(&documents, |_| pb.inc(1))
        .await?;
    pb.finish_and_clear();

    for doc in &report.documents {
        println!("  {} ({} chunks)", doc.file_name, doc.chunk_count);
    }
    println!(
        "Indexed {} document(s), {} chunk(s) into {}",
        report.documents.len(),
        report.chunks,
        index_path.display()
    );
    Ok(())
}
