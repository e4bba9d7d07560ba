//! HTTP server initialization.
//!
//! [`build_state`] wires the session store, inference gateway and document
//! index into the shared [`AppState`]; [`serve`] also owns the inference
//! server process and the listener.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{self, AppState, SharedState};
use crate::config::TichatConfig;
use crate::index::DocumentIndex;
use crate::inference::{self, EmbeddingProvider, LanguageModel};
use crate::session::store::SessionStore;
use crate::settings::Settings;
use crate::supervisor::InferenceServer;

/// Build handler state. Backend failures are logged and leave that backend
/// unset; only an unusable session directory is fatal.
pub fn build_state(config: &TichatConfig, settings: &Settings) -> Result<SharedState> {
    let sessions = SessionStore::open(config.sessions_dir())
        .context("failed to open session directory")?;
    tracing::info!(
        dir = %sessions.dir().display(),
        sessions = sessions.count_sessions(),
        "session store ready"
    );

    let client = match inference::create_client(&config.inference) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!(error = %e, "failed to create inference client");
            None
        }
    };
    let llm = client
        .clone()
        .map(|c| c as Arc<dyn LanguageModel>);

    if settings.has_credentials() {
        tracing::debug!("settings credentials are not used by the embedded index");
    }
    let index_path = match settings.index_path() {
        Some(path) => path,
        None => {
            if !settings.connection_uri.trim().is_empty() {
                tracing::warn!(
                    uri = %settings.connection_uri,
                    "unsupported connection URI; using the default index location"
                );
            }
            config.default_index_path()
        }
    };

    let index = client.and_then(|client| {
        let embedder: Arc<dyn EmbeddingProvider> = client;
        let path = index_path;
        match DocumentIndex::open(&path, embedder, &config.retrieval) {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                tracing::error!(error = ?e, path = %path.display(), "failed to open document index");
                None
            }
        }
    });

    Ok(Arc::new(AppState::new(
        sessions,
        llm,
        index,
        &config.retrieval.context_prompt,
        config.memory.token_limit,
    )))
}

/// Read `settings.json`. An unreadable or malformed file is logged and
/// replaced by defaults so the server still starts.
pub fn load_settings(config: &TichatConfig) -> Settings {
    match Settings::load_or_create(config.settings_path()) {
        Ok(settings) => {
            tracing::debug!(?settings, "settings loaded");
            settings
        }
        Err(e) => {
            tracing::error!(error = ?e, "failed to load settings; using defaults");
            Settings::default()
        }
    }
}

/// Run the HTTP server until Ctrl-C, starting and stopping the inference
/// server around it when `inference.supervise` is set.
pub async fn serve(config: TichatConfig) -> Result<()> {
    let settings = load_settings(&config);

    let mut supervisor = config
        .inference
        .supervise
        .then(|| InferenceServer::from_config(&config.inference));
    if let Some(server) = supervisor.as_mut() {
        if let Err(e) = server.start() {
            tracing::error!(error = ?e, "inference server not started");
        }
    }

    let result = run_http(&config, &settings).await;

    if let Some(mut server) = supervisor {
        if let Err(e) = server.stop().await {
            tracing::warn!(error = ?e, "failed to stop inference server");
        }
    }
    result
}

async fn run_http(config: &TichatConfig, settings: &Settings) -> Result<()> {
    let state = build_state(config, settings)?;

    let static_dir = config.static_dir();
    let static_dir = if static_dir.is_dir() {
        Some(static_dir)
    } else {
        tracing::warn!(dir = %static_dir.display(), "static UI directory not found; serving API only");
        None
    };
    let router = api::router(state, static_dir.as_deref());

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "tichat listening at http://{bind_addr}/");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
