// ── File-backed configuration source ──
//
// Site files are JSON documents under `config_dir`, each declaring one or
// more sites. The site is looked up by name across every file on each
// call; nothing is cached between invocations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use wifimgr_core::model::ConfigFile;
use wifimgr_core::{ConfigSource, CoreError, DeviceType, LoadedSite, ManagedKeySpec, TemplateStore};

use crate::Settings;
use crate::templates::FileTemplateStore;

/// `*.json` files directly inside `dir`, sorted by name.
pub(crate) fn json_files(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let entries = fs::read_dir(dir).map_err(|source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse one site configuration file. MAC keys are normalized on the way in.
pub fn read_config_file(path: &Path) -> Result<ConfigFile, CoreError> {
    let raw = fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| CoreError::InvalidConfigFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub struct FileConfigSource {
    settings: Settings,
}

impl FileConfigSource {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Path of the file declaring `site_name`, without loading the site.
    pub fn site_path(&self, site_name: &str) -> Result<PathBuf, CoreError> {
        self.load_site(site_name).map(|site| site.path)
    }
}

impl ConfigSource for FileConfigSource {
    fn load_site(&self, site_name: &str) -> Result<LoadedSite, CoreError> {
        let mut found: Option<LoadedSite> = None;
        for path in json_files(&self.settings.config_dir)? {
            let file = read_config_file(&path)?;
            let Some(config) = file.sites.get(site_name) else {
                continue;
            };
            if let Some(first) = &found {
                return Err(CoreError::Config {
                    message: format!(
                        "site '{site_name}' is declared in both {} and {}",
                        first.path.display(),
                        path.display()
                    ),
                });
            }
            debug!(site = site_name, path = %path.display(), "site configuration found");
            found = Some(LoadedSite {
                name: site_name.to_owned(),
                path: path.clone(),
                config: config.clone(),
            });
        }
        found.ok_or_else(|| CoreError::SiteNotConfigured {
            name: site_name.to_owned(),
        })
    }

    fn managed_keys(&self, api_label: &str, device_type: DeviceType) -> Option<ManagedKeySpec> {
        self.settings.managed_keys_for(api_label, device_type)
    }

    fn inventory_file(&self) -> PathBuf {
        self.settings.inventory_file.clone()
    }

    fn load_templates(&self) -> Result<Arc<dyn TemplateStore>, CoreError> {
        Ok(Arc::new(FileTemplateStore::load(&self.settings.templates_dir)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wifimgr_core::MacAddress;

    fn source_with(files: &[(&str, serde_json::Value)]) -> (tempfile::TempDir, FileConfigSource) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        fs::create_dir_all(&settings.config_dir).unwrap();
        for (name, body) in files {
            fs::write(settings.config_dir.join(name), body.to_string()).unwrap();
        }
        (dir, FileConfigSource::new(settings))
    }

    #[test]
    fn site_is_found_across_files_with_normalized_macs() {
        let (_dir, source) = source_with(&[
            ("a.json", json!({ "version": 1, "sites": { "hq": {} } })),
            ("b.json", json!({ "version": 1, "sites": { "lab": {
                "api": "mist-prod",
                "devices": { "ap": { "AA-BB-CC-DD-EE-01": { "name": "ap-1" } } }
            } } })),
            ("notes.txt", json!("ignored")),
        ]);

        let site = source.load_site("lab").unwrap();
        assert_eq!(site.path.file_name().unwrap(), "b.json");
        assert_eq!(site.config.api.as_deref(), Some("mist-prod"));
        let mac = MacAddress::parse("aa:bb:cc:dd:ee:01").unwrap();
        assert_eq!(site.config.devices.ap[&mac]["name"], "ap-1");
    }

    #[test]
    fn unknown_site_is_not_configured() {
        let (_dir, source) = source_with(&[("a.json", json!({ "sites": { "hq": {} } }))]);
        assert!(matches!(
            source.load_site("lab"),
            Err(CoreError::SiteNotConfigured { .. })
        ));
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let (_dir, source) = source_with(&[("a.json", json!({ "sites": { "lab": {
            "devices": { "ap": { "not-a-mac": {} } }
        } } }))]);
        let err = source.load_site("lab").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfigFile { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn duplicate_site_declarations_are_rejected() {
        let (_dir, source) = source_with(&[
            ("a.json", json!({ "sites": { "lab": {} } })),
            ("b.json", json!({ "sites": { "lab": {} } })),
        ]);
        assert!(matches!(source.load_site("lab"), Err(CoreError::Config { .. })));
    }

    #[test]
    fn missing_templates_dir_fails_to_load() {
        let (_dir, source) = source_with(&[]);
        assert!(source.load_templates().is_err());
    }
}
