//! Persisted connection settings (`settings.json`).
//!
//! The file is read once at startup. When it is missing, a file with empty
//! values is written and those defaults are returned. There is no runtime
//! writer beyond that; users edit the file by hand.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Connection credentials for the vector store.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Location of the vector store. Older files used `uri` or `connectionString`.
    #[serde(default, alias = "uri", alias = "connectionString")]
    pub connection_uri: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("connection_uri", &self.connection_uri)
            .finish()
    }
}

impl Settings {
    /// Load settings from `path`, creating the file with empty values if it does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse settings file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "settings file doesn't exist, creating a new one");
                let settings = Settings::default();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create directory {}", parent.display())
                    })?;
                }
                let json = serde_json::to_string_pretty(&settings)?;
                std::fs::write(path, json)
                    .with_context(|| format!("failed to write settings file {}", path.display()))?;
                Ok(settings)
            }
            Err(e) => Err(e)
                .with_context(|| format!("failed to read settings file {}", path.display())),
        }
    }

    /// SQLite file named by `connection_uri`.
    ///
    /// Accepts a bare path, `sqlite://<path>` or `file:<path>`. Returns `None`
    /// when the URI is empty or uses another scheme.
    pub fn index_path(&self) -> Option<PathBuf> {
        let uri = self.connection_uri.trim();
        if uri.is_empty() {
            return None;
        }
        let path = if let Some(rest) = uri.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = uri.strip_prefix("file:") {
            rest
        } else if uri.contains("://") {
            return None;
        } else {
            uri
        };
        Some(crate::config::expand_tilde(path))
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");

        let settings = Settings::load_or_create(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["connection_uri"], "");
        assert_eq!(written["username"], "");
    }

    #[test]
    fn existing_file_is_loaded_with_legacy_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"username": "alice", "password": "pw", "connectionString": "sqlite:///tmp/idx.db"}"#,
        )
        .unwrap();

        let settings = Settings::load_or_create(&path).unwrap();
        assert_eq!(settings.username, "alice");
        assert!(settings.has_credentials());
        assert_eq!(settings.index_path(), Some(PathBuf::from("/tmp/idx.db")));
    }

    #[test]
    fn index_path_rejects_foreign_schemes() {
        let settings = Settings {
            connection_uri: "mysql://root@localhost:4000/test".into(),
            ..Settings::default()
        };
        assert_eq!(settings.index_path(), None);

        let settings = Settings {
            connection_uri: "/var/lib/tichat/index.db".into(),
            ..Settings::default()
        };
        assert_eq!(
            settings.index_path(),
            Some(PathBuf::from("/var/lib/tichat/index.db"))
        );
        assert_eq!(Settings::default().index_path(), None);
    }

    #[test]
    fn debug_redacts_password() {
        let settings = Settings {
            password: "hunter2".into(),
            ..Settings::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
