//! Flat-file session store.
//!
//! Each session is one JSON array file. Appends read the full array, push one
//! record and rewrite the file through a temp file + rename, so a crash leaves
//! either the old or the new array on disk.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{LoadedSession, SessionEntry, SessionError, SessionRecord};

const SESSION_PREFIX: &str = "session_";
const SESSION_EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SessionError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files in the session directory. A missing directory counts as zero.
    pub fn count_sessions(&self) -> usize {
        match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .count(),
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "session directory unreadable");
                0
            }
        }
    }

    /// Allocate the next session file (`count + 1`, skipping taken names) holding `[]`.
    pub fn create_session(&self) -> Result<PathBuf, SessionError> {
        let mut number = self.count_sessions() + 1;
        loop {
            let path = self
                .dir
                .join(format!("{SESSION_PREFIX}{number}.{SESSION_EXT}"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(b"[]")
                        .map_err(|source| SessionError::Io {
                            path: path.clone(),
                            source,
                        })?;
                    debug!(path = %path.display(), "session created");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => number += 1,
                Err(source) => return Err(SessionError::Io { path, source }),
            }
        }
    }

    /// Append one record to the session at `path`.
    pub fn append(&self, path: &Path, record: &SessionRecord) -> Result<(), SessionError> {
        let mut records = read_records(path)?;
        records.push(record.clone());
        write_records(path, &records)
    }

    /// `(title, filename)` for every session whose first record is a title,
    /// ordered by session number.
    pub fn list_sessions(&self) -> Result<Vec<SessionEntry>, SessionError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SessionError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut sessions: Vec<(u64, SessionEntry)> = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXT) || !path.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let records = match read_records(&path) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable session file");
                    continue;
                }
            };
            if let Some(title) = records.first().and_then(SessionRecord::as_title) {
                sessions.push((
                    session_number(filename).unwrap_or(u64::MAX),
                    SessionEntry(title.to_string(), filename.to_string()),
                ));
            }
        }

        sessions.sort_by(|(a, ea), (b, eb)| a.cmp(b).then_with(|| ea.1.cmp(&eb.1)));
        Ok(sessions.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Load the session whose file name is exactly `filename`.
    pub fn load_session(&self, filename: &str) -> Result<LoadedSession, SessionError> {
        let not_found = || SessionError::NotFound(filename.to_string());

        if filename.contains(['/', '\\'])
            || Path::new(filename).extension().and_then(|e| e.to_str()) != Some(SESSION_EXT)
        {
            return Err(not_found());
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| SessionError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = entries
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_str() == Some(filename))
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .ok_or_else(not_found)?;

        let records = read_records(&path)?;
        Ok(LoadedSession { path, records })
    }
}

/// Numeric suffix of `session_<n>.json`.
fn session_number(filename: &str) -> Option<u64> {
    filename
        .strip_prefix(SESSION_PREFIX)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn read_records(path: &Path) -> Result<Vec<SessionRecord>, SessionError> {
    let contents = fs::read_to_string(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| SessionError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn write_records(path: &Path, records: &[SessionRecord]) -> Result<(), SessionError> {
    let io_err = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_vec(records).map_err(|source| SessionError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(io_err)?;
    fs::rename(&tmp_path, path).map_err(io_err)
}
