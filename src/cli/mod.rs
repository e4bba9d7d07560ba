pub mod doctor;
pub mod history;
pub mod ingest;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tichat::config::InferenceConfig;
use tichat::inference::ollama::{self, PullStatus};
use tichat::inference;

/// Pull the configured chat and embedding models onto the inference server.
pub async fn model_pull(config: &InferenceConfig) -> Result<()> {
    let client = inference::create_client(config)?;

    let installed = client
        .list_models()
        .await
        .context("inference server is not reachable")?;

    for model in [&config.model, &config.embed_model] {
        if ollama::model_installed(&installed, model) {
            println!("{model}: already installed");
            continue;
        }

        println!("Pulling {model}...");
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {msg:<24} {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                .context("invalid progress template")?
                .progress_chars("##-"),
        );

        client
            .pull(model, |status: &PullStatus| {
                pb.set_message(status.status.clone());
                if let Some(total) = status.total {
                    pb.set_length(total);
                }
                if let Some(completed) = status.completed {
                    pb.set_position(completed);
                }
            })
            .await
            .with_context(|| format!("failed to pull {model}"))?;

        pb.finish_and_clear();
        println!("{model}: ready");
    }

    println!("Models ready.");
    Ok(())
}
