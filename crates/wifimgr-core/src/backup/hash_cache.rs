// ── Config file change detection ──
//
// Maps a config path to the SHA-256 of its content and its mtime. An equal
// mtime short-circuits; otherwise the content hash decides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashEntry {
    pub hash: String,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

impl FileHashEntry {
    pub fn of(path: &Path) -> Result<Self, CoreError> {
        let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
        Ok(Self {
            hash: hex::encode(Sha256::digest(&bytes)),
            mtime: mtime_of(path)?,
        })
    }
}

fn mtime_of(path: &Path) -> Result<i64, CoreError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| CoreError::io(path, e))?;
    Ok(chrono::DateTime::<chrono::Utc>::from(modified).timestamp())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileHashCache {
    #[serde(default)]
    files: BTreeMap<String, FileHashEntry>,
}

impl FileHashCache {
    /// Load from disk. A missing or unreadable cache is empty, so every
    /// file counts as changed.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read hash cache");
                return Self::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring malformed hash cache");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let tmp = tmp_path(path);
        fs::write(&tmp, serde_json::to_vec_pretty(self)?).map_err(|e| CoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))
    }

    pub fn get(&self, file: &Path) -> Option<&FileHashEntry> {
        self.files.get(&key(file))
    }

    /// Whether `file` is identical to when it was last recorded.
    pub fn is_unchanged(&self, file: &Path) -> Result<bool, CoreError> {
        let Some(known) = self.get(file) else {
            return Ok(false);
        };
        if mtime_of(file)? == known.mtime {
            debug!(file = %file.display(), "config mtime unchanged");
            return Ok(true);
        }
        Ok(FileHashEntry::of(file)?.hash == known.hash)
    }

    pub fn record(&mut self, file: &Path) -> Result<(), CoreError> {
        let entry = FileHashEntry::of(file)?;
        self.files.insert(key(file), entry);
        Ok(())
    }
}

fn key(file: &Path) -> String {
    fs::canonicalize(file)
        .unwrap_or_else(|_| file.to_path_buf())
        .display()
        .to_string()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
