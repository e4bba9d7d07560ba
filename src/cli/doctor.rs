//! CLI `doctor` command: check the inference server, models, index and sessions.

use std::sync::Arc;

use anyhow::Result;
use tichat::config::TichatConfig;
use tichat::index::DocumentIndex;
use tichat::inference::{self, InferenceError};
use tichat::session::store::SessionStore;
use tichat::settings::Settings;

pub async fn doctor(config: &TichatConfig) -> Result<()> {
    let settings = Settings::load_or_create(config.settings_path())?;
    let client = Arc::new(inference::create_client(&config.inference)?);

    println!("tichat Health Report");
    println!("====================");
    println!();
    println!("Data dir:          {}", config.data_dir().display());
    println!("Settings:          {}", config.settings_path().display());
    println!();

    println!("Inference server:  {}", client.base_url());
    match client.check_availability().await {
        Ok(()) => println!("  Status:          OK"),
        Err(InferenceError::ModelNotFound(model)) => {
            println!("  Status:          reachable, model '{model}' missing");
            println!("  Run `tichat model pull` to install it.");
        }
        Err(e) => println!("  Status:          {e}"),
    }
    println!("  Chat model:      {}", config.inference.model);
    println!("  Embed model:     {}", config.inference.embed_model);
    println!();

    let index_path = settings
        .index_path()
        .unwrap_or_else(|| config.default_index_path());
    println!("Document index:    {}", index_path.display());
    if index_path.exists() {
        match DocumentIndex::open(&index_path, client, &config.retrieval) {
            Ok(index) => {
                let stats = index.stats().await?;
                println!("  Documents:       {}", stats.documents);
                println!("  Chunks:          {}", stats.chunks);
                println!(
                    "  Embedded with:   {}",
                    stats.embedding_model.as_deref().unwrap_or("(not set)")
                );
                println!("  Dimensions:      {}", stats.embedding_dim);
            }
            Err(e) => println!("  Status:          FAILED ({e:#})"),
        }
    } else {
        println!("  Status:          not created yet");
    }
    println!();

    let sessions = SessionStore::open(config.sessions_dir())?;
    println!("Sessions:          {}", sessions.dir().display());
    println!("  Files:           {}", sessions.count_sessions());
    println!("  Titled:          {}", sessions.list_sessions()?.len());

    Ok(())
}
