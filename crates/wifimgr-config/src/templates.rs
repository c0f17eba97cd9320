// ── WLAN template files ──

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};

use wifimgr_core::model::ConfigDoc;
use wifimgr_core::{CoreError, TemplateStore, WlanTemplate};

use crate::source::json_files;

/// On-disk shape of one template file: `{"wlan": {label: template}}`.
#[derive(Debug, Default, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    wlan: IndexMap<String, ConfigDoc>,
}

/// Templates loaded from every `*.json` file in a directory.
///
/// When a label appears in more than one file, the file that sorts first
/// wins.
#[derive(Debug, Default)]
pub struct FileTemplateStore {
    wlans: HashMap<String, WlanTemplate>,
}

impl FileTemplateStore {
    pub fn load(dir: &Path) -> Result<Self, CoreError> {
        if !dir.is_dir() {
            return Err(CoreError::Config {
                message: format!("templates directory {} does not exist", dir.display()),
            });
        }
        let mut store = Self::default();
        for path in json_files(dir)? {
            let raw = fs::read_to_string(&path).map_err(|source| CoreError::Io {
                path: path.clone(),
                source,
            })?;
            let file: TemplateFile =
                serde_json::from_str(&raw).map_err(|e| CoreError::InvalidConfigFile {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            for (label, body) in file.wlan {
                if store.wlans.contains_key(&label) {
                    let path = path.display();
                    warn!(label = %label, %path, "duplicate WLAN template ignored");
                    continue;
                }
                store.wlans.insert(label.clone(), WlanTemplate::new(label, body));
            }
        }
        debug!(dir = %dir.display(), count = store.wlans.len(), "WLAN templates loaded");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.wlans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wlans.is_empty()
    }
}

impl TemplateStore for FileTemplateStore {
    fn wlan_template(&self, label: &str) -> Option<WlanTemplate> {
        self.wlans.get(label).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wifimgr_core::Vendor;

    #[test]
    fn templates_load_and_expand() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("10-corp.json"),
            json!({ "wlan": {
                "corp": { "ssid": "Corp", "vlan_id": 10, "mist": { "apply_to": "site" } }
            } })
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join("20-dup.json"),
            json!({ "wlan": { "corp": { "ssid": "Other" }, "guest": { "ssid": "Guest" } } })
                .to_string(),
        )
        .unwrap();

        let store = FileTemplateStore::load(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        let corp = store.wlan_template("corp").unwrap();
        assert_eq!(corp.expand(Vendor::Mist)["ssid"], "Corp");
        assert!(store.wlan_template("missing").is_none());
    }

    #[test]
    fn malformed_template_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ \"wlan\": [").unwrap();
        assert!(matches!(
            FileTemplateStore::load(dir.path()),
            Err(CoreError::InvalidConfigFile { .. })
        ));
    }
}
