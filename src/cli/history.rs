//! CLI `history` command: list saved chat sessions.

use anyhow::{Context, Result};
use tichat::config::TichatConfig;
use tichat::session::store::SessionStore;

pub fn history(config: &TichatConfig) -> Result<()> {
    let store = SessionStore::open(config.sessions_dir())
        .context("failed to open session directory")?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No saved sessions in {}", store.dir().display());
        return Ok(());
    }

    let width = sessions
        .iter()
        .map(|s| s.filename().len())
        .max()
        .unwrap_or(0);
    for entry in &sessions {
        println!("{:<width$}  {}", entry.filename(), entry.title());
    }
    println!();
    println!("{} session(s) in {}", sessions.len(), store.dir().display());
    Ok(())
}
