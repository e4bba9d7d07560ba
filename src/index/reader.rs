//! Turns files on disk into plain-text [`Document`]s.
//!
//! PDF text is pulled out with `lopdf`, Markdown is flattened with
//! `pulldown-cmark`, and everything else is read as (lossy) UTF-8.

use std::path::Path;

use anyhow::{Context, Result};
use pulldown_cmark::{Event, Options, Parser, Tag};
use tracing::{debug, warn};

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub text: String,
}

/// Read every visible regular file directly inside `dir`, sorted by name.
///
/// Files that fail to parse or contain no text are skipped with a log line.
pub fn read_directory(dir: &Path) -> Result<Vec<Document>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && !is_hidden(p))
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match read_file(&path) {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => debug!(file = %path.display(), "no text extracted"),
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(documents)
}

/// Read one file. Returns `None` if it holds no text.
pub fn read_file(path: &Path) -> Result<Option<Document>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let text = match extension.as_deref() {
        Some("pdf") => pdf_text(&bytes)
            .with_context(|| format!("failed to extract PDF text from {}", path.display()))?,
        Some("md") | Some("markdown") => markdown_text(&String::from_utf8_lossy(&bytes)),
        _ => String::from_utf8_lossy(&bytes).into_owned(),
    };

    if text.trim().is_empty() {
        return Ok(None);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Some(Document { file_name, text }))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn pdf_text(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    Ok(doc.extract_text(&pages)?)
}

fn markdown_text(md: &str) -> String {
    let mut out = String::new();
    let parser = Parser::new_ext(md, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES);
    for event in parser {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(Tag::Paragraph | Tag::Heading(..) | Tag::Item | Tag::CodeBlock(_)) => {
                out.push('\n')
            }
            _ => {}
        }
    }
    out
}
