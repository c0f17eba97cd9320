//! Settings and on-disk configuration for wifimgr.
//!
//! Tool settings come from TOML + environment via `figment`; site files and
//! WLAN templates are JSON documents under the configured directories.
//! [`FileConfigSource`] and [`FileTemplateStore`] plug them into the apply
//! engine as its `ConfigSource` and `TemplateStore` collaborators.

pub mod source;
pub mod templates;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wifimgr_core::backup::{DEFAULT_MAX_AGE_DAYS, DEFAULT_RETENTION};
use wifimgr_core::{DeviceType, ManagedKeySpec};

pub use source::FileConfigSource;
pub use templates::FileTemplateStore;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("settings file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Tool settings. Every path may be relative to the working directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Directory holding the site configuration files (`*.json`).
    pub config_dir: PathBuf,

    /// Local inventory allowlist.
    pub inventory_file: PathBuf,

    /// Directory holding WLAN template files (`*.json`).
    pub templates_dir: PathBuf,

    /// Directory receiving configuration backups and device snapshots.
    pub backup_dir: PathBuf,

    /// Per-file content hashes of the last clean apply.
    pub hash_cache_file: PathBuf,

    /// Exported cache snapshot used by the command-line tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,

    #[serde(default)]
    pub backups: BackupSettings,

    /// API label → device type → managed dot-paths.
    #[serde(default)]
    pub managed_keys: BTreeMap<String, BTreeMap<DeviceType, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    #[serde(default = "default_retention")]
    pub retention: usize,

    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            max_age_days: default_max_age_days(),
        }
    }
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}
fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self::rooted_at(&data_dir())
    }
}

impl Settings {
    /// Defaults with every path under one directory.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config_dir: root.join("sites"),
            inventory_file: root.join("inventory.json"),
            templates_dir: root.join("templates"),
            backup_dir: root.join("backups"),
            hash_cache_file: root.join("state").join("file-hashes.json"),
            cache_file: None,
            backups: BackupSettings::default(),
            managed_keys: BTreeMap::new(),
        }
    }

    /// Declared managed keys for an API label and device type.
    ///
    /// `None` when the label or the type is missing. A declared empty list
    /// is `Some` and means the tool owns every field.
    pub fn managed_keys_for(
        &self,
        api_label: &str,
        device_type: DeviceType,
    ) -> Option<ManagedKeySpec> {
        self.managed_keys
            .get(api_label)?
            .get(&device_type)
            .map(|keys| ManagedKeySpec::new(keys.iter().map(String::as_str)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backups.retention == 0 {
            return Err(ConfigError::Validation {
                field: "backups.retention".into(),
                reason: "must keep at least one backup".into(),
            });
        }
        for (api, types) in &self.managed_keys {
            for (device_type, keys) in types {
                let malformed =
                    |k: &&String| k.trim().is_empty() || k.split('.').any(str::is_empty);
                if let Some(bad) = keys.iter().find(malformed) {
                    return Err(ConfigError::Validation {
                        field: format!("managed_keys.{api}.{device_type}"),
                        reason: format!("malformed key path '{bad}'"),
                    });
                }
            }
        }
        Ok(())
    }
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn settings_path() -> PathBuf {
    ProjectDirs::from("io", "wifimgr", "wifimgr").map_or_else(
        || fallback_dir(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("io", "wifimgr", "wifimgr")
        .map_or_else(|| fallback_dir(".local/share"), |dirs| dirs.data_dir().to_path_buf())
}

fn fallback_dir(under_home: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(under_home);
    p.push("wifimgr");
    p
}

// ── Settings loading ────────────────────────────────────────────────

/// Layered settings: defaults → TOML file → `WIFIMGR_*` environment.
///
/// An explicit path must exist; the platform default path is optional.
/// Nested fields use a double underscore in the environment, e.g.
/// `WIFIMGR_BACKUPS__RETENTION=5`.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match explicit {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Some(path) => path.to_path_buf(),
        None => settings_path(),
    };

    let settings: Settings = figment_for(&path).extract()?;
    settings.validate()?;
    Ok(settings)
}

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WIFIMGR_").split("__"))
}

/// Serialize settings to TOML at `path`.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_and_env_layers_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "wifimgr.toml",
                r#"
                config_dir = "sites"
                [backups]
                retention = 4
                [managed_keys.mist-prod]
                ap = ["name", "radio_config.band_5.power"]
                switch = []
                "#,
            )?;
            jail.set_env("WIFIMGR_BACKUPS__MAX_AGE_DAYS", "7");

            let settings = load_settings(Some(Path::new("wifimgr.toml"))).unwrap();
            assert_eq!(settings.config_dir, PathBuf::from("sites"));
            assert_eq!(settings.backups.retention, 4);
            assert_eq!(settings.backups.max_age_days, 7);

            let ap = settings.managed_keys_for("mist-prod", DeviceType::Ap).unwrap();
            assert_eq!(ap.keys(), ["name", "radio_config.band_5.power"]);
            assert!(settings.managed_keys_for("mist-prod", DeviceType::Switch).unwrap().is_empty());
            assert!(settings.managed_keys_for("mist-prod", DeviceType::Gateway).is_none());
            assert!(settings.managed_keys_for("other", DeviceType::Ap).is_none());
            Ok(())
        });
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/wifimgr.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn zero_retention_is_rejected() {
        let mut settings = Settings::rooted_at(Path::new("/tmp/w"));
        settings.backups.retention = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn malformed_key_path_is_rejected() {
        let mut settings = Settings::rooted_at(Path::new("/tmp/w"));
        settings
            .managed_keys
            .insert("mist".into(), BTreeMap::from([(DeviceType::Ap, vec!["radio..power".into()])]));
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("managed_keys.mist.ap"));
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let settings = Settings::rooted_at(dir.path());
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.backup_dir, dir.path().join("backups"));
        assert_eq!(loaded.backups.retention, DEFAULT_RETENTION);
    }
}
