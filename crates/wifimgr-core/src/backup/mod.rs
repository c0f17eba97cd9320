// ── Rotating local backups ──
//
// Backups live in one directory as `<basename>.<serial>`, serial 0 newest.
// Every write is "temp file, rotate, rename" so an interrupted run leaves
// either the old set or the fully rotated new set. Rollback is local only:
// it swaps the live file with a backup and never calls a vendor API.

pub mod hash_cache;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{ConfigFile, DeviceState, DeviceType};

pub use hash_cache::{FileHashCache, FileHashEntry};

pub const DEFAULT_RETENTION: usize = 10;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;

/// Field injected into backed-up config files, at root and per site.
pub const LAST_MODIFIED_KEY: &str = "last_modified";

const SNAPSHOT_VERSION: u32 = 1;

// ── Rotation ────────────────────────────────────────────────────────

/// Existing serials for `base` in `dir`, ascending.
pub fn existing_serials(dir: &Path, base: &str) -> Result<Vec<usize>, CoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::io(dir, e)),
    };
    let prefix = format!("{base}.");
    let mut serials: Vec<usize> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            name.strip_prefix(&prefix)?.parse().ok()
        })
        .collect();
    serials.sort_unstable();
    Ok(serials)
}

fn serial_path(dir: &Path, base: &str, serial: usize) -> PathBuf {
    dir.join(format!("{base}.{serial}"))
}

/// Shift every serial up by one, deleting anything that would reach `max`.
/// Serial 0 is free afterwards.
pub fn rotate(dir: &Path, base: &str, max: usize) -> Result<(), CoreError> {
    let max = max.max(1);
    for serial in existing_serials(dir, base)?.into_iter().rev() {
        let from = serial_path(dir, base, serial);
        if serial + 1 >= max {
            fs::remove_file(&from).map_err(|e| CoreError::io(&from, e))?;
            debug!(base, serial, "discarded oldest backup");
        } else {
            let to = serial_path(dir, base, serial + 1);
            fs::rename(&from, &to).map_err(|e| CoreError::io(&from, e))?;
        }
    }
    Ok(())
}

// ── Records ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub serial: usize,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteSummary {
    pub name: String,
    pub aps: usize,
    pub switches: usize,
    pub gateways: usize,
    pub wlans: usize,
}

/// Result of a read-only structural check of a backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub version: u32,
    pub last_modified: Option<String>,
    pub sites: Vec<SiteSummary>,
}

impl BackupSummary {
    pub fn device_count(&self) -> usize {
        self.sites.iter().map(|s| s.aps + s.switches + s.gateways).sum()
    }
}

/// Pre-update capture of the live device states of one site and type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub site_name: String,
    pub site_id: String,
    pub api_label: String,
    pub device_type: DeviceType,
    pub device_count: usize,
    pub operation: String,
    pub device_states: Vec<DeviceState>,
}

impl DeviceSnapshot {
    pub fn new(
        site_name: impl Into<String>,
        site_id: impl Into<String>,
        api_label: impl Into<String>,
        device_type: DeviceType,
        operation: impl Into<String>,
        device_states: Vec<DeviceState>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp: Utc::now(),
            site_name: site_name.into(),
            site_id: site_id.into(),
            api_label: api_label.into(),
            device_type,
            device_count: device_states.len(),
            operation: operation.into(),
            device_states,
        }
    }

    pub fn basename(&self) -> String {
        format!("{}-{}-devices.json", self.site_name, self.device_type)
    }
}

// ── BackupManager ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    retention: usize,
    max_age_days: u32,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retention: DEFAULT_RETENTION,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    #[must_use]
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Path of backup `serial` for a live file.
    pub fn backup_path(&self, live: &Path, serial: usize) -> Result<PathBuf, CoreError> {
        Ok(serial_path(&self.dir, &basename(live)?, serial))
    }

    /// Back up a config file as the new serial 0, with `last_modified`
    /// injected at root and into every site.
    pub fn write_backup(&self, live: &Path) -> Result<PathBuf, CoreError> {
        let raw = fs::read_to_string(live).map_err(|e| CoreError::io(live, e))?;
        let mut doc: Value = serde_json::from_str(&raw).map_err(|e| CoreError::InvalidConfigFile {
            path: live.to_path_buf(),
            message: e.to_string(),
        })?;
        inject_last_modified(&mut doc, &Utc::now().to_rfc3339());
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let path = self.write_rotated(&basename(live)?, &bytes)?;
        info!(source = %live.display(), backup = %path.display(), "configuration backed up");
        Ok(path)
    }

    pub fn write_device_snapshot(&self, snapshot: &DeviceSnapshot) -> Result<PathBuf, CoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let path = self.write_rotated(&snapshot.basename(), &bytes)?;
        info!(
            site = %snapshot.site_name,
            device_type = %snapshot.device_type,
            count = snapshot.device_count,
            backup = %path.display(),
            "device states captured"
        );
        Ok(path)
    }

    /// Temp write, rotate, rename into serial 0. No await point inside.
    fn write_rotated(&self, base: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| CoreError::io(&self.dir, e))?;
        let tmp = self.dir.join(format!(".{base}.tmp"));
        fs::write(&tmp, bytes).map_err(|e| CoreError::io(&tmp, e))?;
        if let Err(e) = rotate(&self.dir, base, self.retention) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        let target = serial_path(&self.dir, base, 0);
        fs::rename(&tmp, &target).map_err(|e| CoreError::io(&tmp, e))?;
        Ok(target)
    }

    /// Swap the live file with backup `serial`; the pre-rollback live
    /// content becomes the new serial 0.
    pub fn rollback(&self, live: &Path, serial: usize) -> Result<PathBuf, CoreError> {
        let base = basename(live)?;
        let source = serial_path(&self.dir, &base, serial);
        if !source.exists() {
            return Err(CoreError::Backup {
                message: format!("no backup {serial} for {base} in {}", self.dir.display()),
            });
        }
        let live_content = fs::read(live).map_err(|e| CoreError::io(live, e))?;
        let backup_content = fs::read(&source).map_err(|e| CoreError::io(&source, e))?;

        let live_dir = live.parent().unwrap_or_else(|| Path::new("."));
        let staged_live = live_dir.join(format!(".{base}.rollback"));
        fs::write(&staged_live, &backup_content).map_err(|e| CoreError::io(&staged_live, e))?;

        let new_zero = match self.write_rotated(&base, &live_content) {
            Ok(path) => path,
            Err(e) => {
                let _ = fs::remove_file(&staged_live);
                return Err(e);
            }
        };
        fs::rename(&staged_live, live).map_err(|e| CoreError::io(live, e))?;
        info!(live = %live.display(), serial, "rolled back configuration");
        Ok(new_zero)
    }

    pub fn list_backups(&self, live: &Path) -> Result<Vec<BackupEntry>, CoreError> {
        let base = basename(live)?;
        existing_serials(&self.dir, &base)?
            .into_iter()
            .map(|serial| {
                let path = serial_path(&self.dir, &base, serial);
                let meta = fs::metadata(&path).map_err(|e| CoreError::io(&path, e))?;
                let modified = meta.modified().map_err(|e| CoreError::io(&path, e))?;
                Ok(BackupEntry {
                    serial,
                    path,
                    modified: modified.into(),
                    size: meta.len(),
                })
            })
            .collect()
    }

    /// Delete every backup older than `days` (the configured age when
    /// `None`), then renumber the survivors so serials stay contiguous.
    /// Returns the deleted paths.
    pub fn cleanup_older_than(&self, days: Option<u32>) -> Result<Vec<PathBuf>, CoreError> {
        let days = days.unwrap_or(self.max_age_days);
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::io(&self.dir, e)),
        };

        let mut by_base: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut removed = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let Some((base, serial)) = split_serial(&name) else {
                continue;
            };
            let path = entry.path();
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| CoreError::io(&path, e))?;
            if modified < cutoff {
                fs::remove_file(&path).map_err(|e| CoreError::io(&path, e))?;
                debug!(path = %path.display(), "deleted expired backup");
                removed.push(path);
            } else {
                by_base.entry(base.to_owned()).or_default().push(serial);
            }
        }

        for (base, mut serials) in by_base {
            serials.sort_unstable();
            for (index, serial) in serials.into_iter().enumerate() {
                if index != serial {
                    let from = serial_path(&self.dir, &base, serial);
                    let to = serial_path(&self.dir, &base, index);
                    fs::rename(&from, &to).map_err(|e| CoreError::io(&from, e))?;
                }
            }
        }

        removed.sort();
        if !removed.is_empty() {
            info!(count = removed.len(), days, "expired backups removed");
        }
        Ok(removed)
    }
}

/// Read-only structural check: the file parses as a config file with at
/// least one site.
pub fn validate_backup(path: &Path) -> Result<BackupSummary, CoreError> {
    let raw = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    let file: ConfigFile = serde_json::from_str(&raw).map_err(|e| CoreError::InvalidConfigFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if file.sites.is_empty() {
        return Err(CoreError::Backup {
            message: format!("{} contains no sites", path.display()),
        });
    }
    let sites = file
        .sites
        .iter()
        .map(|(name, site)| SiteSummary {
            name: name.clone(),
            aps: site.devices.ap.len(),
            switches: site.devices.switch.len(),
            gateways: site.devices.gateway.len(),
            wlans: site.profiles.wlan.len(),
        })
        .collect();
    Ok(BackupSummary {
        path: path.to_path_buf(),
        version: file.version,
        last_modified: file
            .extra
            .get(LAST_MODIFIED_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned),
        sites,
    })
}

fn basename(live: &Path) -> Result<String, CoreError> {
    live.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| CoreError::Backup {
            message: format!("cannot derive a backup name from {}", live.display()),
        })
}

fn split_serial(name: &str) -> Option<(&str, usize)> {
    if name.starts_with('.') {
        return None;
    }
    let (base, serial) = name.rsplit_once('.')?;
    if base.is_empty() || !serial.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, serial.parse().ok()?))
}

fn inject_last_modified(doc: &mut Value, stamp: &str) {
    let Value::Object(root) = doc else {
        warn!("backup source is not a JSON object; timestamp not injected");
        return;
    };
    root.insert(LAST_MODIFIED_KEY.into(), Value::String(stamp.to_owned()));
    if let Some(Value::Object(sites)) = root.get_mut("sites") {
        for site in sites.values_mut() {
            if let Value::Object(site) = site {
                site.insert(LAST_MODIFIED_KEY.into(), Value::String(stamp.to_owned()));
            }
        }
    }
}
