use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// System prompt used by the retrieval chat engine. `{context_str}` is replaced
/// with the retrieved chunks.
pub const DEFAULT_CONTEXT_PROMPT: &str = "You are a chatbot, who needs to answer questions, \
preferably using the provided context.\n\
Here are the relevant documents for the context:\n\
{context_str}\n\
Instruction: Use the previous chat history, or the context above, to interact and help the user.";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TichatConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Directory holding the bundled web UI (`index.html` and assets).
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub embed_model: String,
    pub request_timeout_secs: u64,
    /// Spawn and own the inference server process.
    pub supervise: bool,
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub similarity_top_k: usize,
    pub embedding_dim: usize,
    pub context_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub token_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            log_level: "info".into(),
            static_dir: "web/build".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_tichat_dir().to_string_lossy().into_owned(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "mistral:instruct".into(),
            embed_model: "mxbai-embed-large".into(),
            request_timeout_secs: 120,
            supervise: true,
            command: "ollama".into(),
            args: vec!["serve".into()],
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            similarity_top_k: 7,
            embedding_dim: 1024,
            context_prompt: DEFAULT_CONTEXT_PROMPT.into(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { token_limit: 4096 }
    }
}

/// Returns `~/.tichat/`, or `./.tichat` when no home directory is known.
pub fn default_tichat_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tichat")
}

/// Returns the default config file path: `~/.tichat/config.toml`
pub fn default_config_path() -> PathBuf {
    default_tichat_dir().join("config.toml")
}

impl TichatConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            TichatConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (TICHAT_DATA_DIR, TICHAT_LOG_LEVEL, TICHAT_OLLAMA_URL, TICHAT_MODEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TICHAT_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("TICHAT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("TICHAT_OLLAMA_URL") {
            self.inference.base_url = val;
        }
        if let Ok(val) = std::env::var("TICHAT_MODEL") {
            self.inference.model = val;
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Directory of `session_<n>.json` transcripts.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir().join("prev_msgs")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }

    /// Index location used when the settings file does not name one.
    pub fn default_index_path(&self) -> PathBuf {
        self.data_dir().join("index.db")
    }

    pub fn static_dir(&self) -> PathBuf {
        expand_tilde(&self.server.static_dir)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TichatConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.inference.model, "mistral:instruct");
        assert_eq!(config.retrieval.similarity_top_k, 7);
        assert_eq!(config.memory.token_limit, 4096);
        assert!(config.sessions_dir().ends_with("prev_msgs"));
        assert!(config.retrieval.context_prompt.contains("{context_str}"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
port = 8080

[storage]
data_dir = "/tmp/tichat-test"

[inference]
model = "llama3:8b"
supervise = false
"#;
        let config: TichatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sessions_dir(), PathBuf::from("/tmp/tichat-test/prev_msgs"));
        assert_eq!(config.inference.model, "llama3:8b");
        assert!(!config.inference.supervise);
        // defaults still apply for unset fields
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.inference.args, vec!["serve".to_string()]);
        assert_eq!(config.retrieval.chunk_size, 512);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TichatConfig::default();
        std::env::set_var("TICHAT_DATA_DIR", "/tmp/override");
        std::env::set_var("TICHAT_LOG_LEVEL", "trace");
        std::env::set_var("TICHAT_OLLAMA_URL", "http://10.0.0.2:11434");
        std::env::set_var("TICHAT_MODEL", "phi3");

        config.apply_env_overrides();

        assert_eq!(config.storage.data_dir, "/tmp/override");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.inference.base_url, "http://10.0.0.2:11434");
        assert_eq!(config.inference.model, "phi3");

        // Clean up
        std::env::remove_var("TICHAT_DATA_DIR");
        std::env::remove_var("TICHAT_LOG_LEVEL");
        std::env::remove_var("TICHAT_OLLAMA_URL");
        std::env::remove_var("TICHAT_MODEL");
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = TichatConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
    }
}
