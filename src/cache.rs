//! File Cache
//!
//! Loads and parses files, keeping the parsed result until the file's
//! modification time or size changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::config::ConfigError;

/// How to parse a cached file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Toml,
    Json,
    Text,
}

/// A parsed file
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    Toml(toml::Table),
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

struct Entry {
    fingerprint: Fingerprint,
    loaded: Arc<Loaded>,
}

/// Parsed files keyed by (path, kind)
#[derive(Default)]
pub struct FileCache {
    entries: Mutex<HashMap<(PathBuf, FileKind), Entry>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path`, re-parsing only if it changed since the last load
    pub fn load(&self, path: &Path, kind: FileKind) -> Result<Arc<Loaded>, ConfigError> {
        self.load_with_status(path, kind).map(|(loaded, _)| loaded)
    }

    /// Like [`FileCache::load`], also reporting whether the file was (re)parsed
    pub fn load_with_status(
        &self,
        path: &Path,
        kind: FileKind,
    ) -> Result<(Arc<Loaded>, bool), ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
        let fingerprint = Fingerprint {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        };

        let key = (path.to_path_buf(), kind);
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| ConfigError::Lock(e.to_string()))?;

        if let Some(entry) = entries.get(&key) {
            if entry.fingerprint == fingerprint {
                return Ok((Arc::clone(&entry.loaded), false));
            }
        }

        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let loaded = Arc::new(parse(path, kind, &content)?);
        tracing::debug!(path = %path.display(), ?kind, "Parsed file");

        entries.insert(
            key,
            Entry {
                fingerprint,
                loaded: Arc::clone(&loaded),
            },
        );
        Ok((loaded, true))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}

fn parse(path: &Path, kind: FileKind, content: &str) -> Result<Loaded, ConfigError> {
    let parse_error = |error: String| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    };

    match kind {
        FileKind::Toml => content
            .parse::<toml::Table>()
            .map(Loaded::Toml)
            .map_err(|e| parse_error(e.to_string())),
        FileKind::Json => serde_json::from_str(content)
            .map(Loaded::Json)
            .map_err(|e| parse_error(e.to_string())),
        FileKind::Text => Ok(Loaded::Text(content.to_string())),
    }
}
