// ── Site configuration ──
//
// The declarative desired state, as parsed from an operator-authored JSON
// file. Device payloads stay generic documents; only the structure the
// engine navigates (sites, device sections, WLAN bindings) is typed.
// Unknown fields round-trip through `extra`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ConfigDoc;
use super::device::DeviceType;
use super::mac::MacAddress;

/// Key under which a device or site lists its WLAN labels.
pub const WLAN_BINDING_KEY: &str = "wlan";

/// One configuration file: a set of named sites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub sites: IndexMap<String, SiteConfiguration>,
    #[serde(flatten)]
    pub extra: ConfigDoc,
}

/// Desired state for one named site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfiguration {
    /// API label of the controller that manages this site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    /// Site-level WLAN bindings, inherited by every AP without its own list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wlan: Vec<String>,

    #[serde(default)]
    pub profiles: Profiles,

    #[serde(default)]
    pub devices: DeviceSections,

    #[serde(flatten)]
    pub extra: ConfigDoc,
}

/// Template lists declaring which objects must exist at the site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profiles {
    /// WLAN templates to create or keep in sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wlan: Vec<String>,

    #[serde(flatten)]
    pub extra: ConfigDoc,
}

/// Per-type device maps, keyed by normalized MAC in file order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSections {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub ap: IndexMap<MacAddress, ConfigDoc>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub switch: IndexMap<MacAddress, ConfigDoc>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub gateway: IndexMap<MacAddress, ConfigDoc>,
}

impl DeviceSections {
    pub fn of_type(&self, device_type: DeviceType) -> &IndexMap<MacAddress, ConfigDoc> {
        match device_type {
            DeviceType::Ap => &self.ap,
            DeviceType::Switch => &self.switch,
            DeviceType::Gateway => &self.gateway,
        }
    }
}

impl SiteConfiguration {
    /// Device-level WLAN binding for an AP, if the device declares one.
    ///
    /// A present-but-empty list is still a binding: it opts the AP out of
    /// the site-level WLANs.
    pub fn device_wlan_binding(&self, mac: &MacAddress) -> Option<Vec<String>> {
        let config = self.devices.ap.get(mac)?;
        let list = config.get(WLAN_BINDING_KEY)?.as_array()?;
        Some(
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
        )
    }

    /// Effective WLAN labels for an AP: its own binding, else the site's.
    pub fn effective_wlans(&self, mac: &MacAddress) -> Vec<String> {
        self.device_wlan_binding(mac)
            .unwrap_or_else(|| self.wlan.clone())
    }
}

/// A site configuration together with where it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedSite {
    pub name: String,
    pub path: std::path::PathBuf,
    pub config: SiteConfiguration,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ConfigFile {
        serde_json::from_value(json!({
            "version": 1,
            "sites": {
                "lab": {
                    "api": "mist-prod",
                    "wlan": ["corp"],
                    "profiles": { "wlan": ["corp", "guest"] },
                    "devices": {
                        "ap": {
                            "AA-BB-CC-DD-EE-01": { "name": "ap-1" },
                            "aa:bb:cc:dd:ee:02": { "name": "ap-2", "wlan": ["guest"] },
                            "aa:bb:cc:dd:ee:03": { "name": "ap-3", "wlan": [] }
                        }
                    },
                    "notes": "kept"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn device_keys_are_normalized() {
        let file = sample();
        let site = &file.sites["lab"];
        let first = site.devices.ap.keys().next().unwrap();
        assert_eq!(first.as_str(), "aa:bb:cc:dd:ee:01");
        assert_eq!(site.extra["notes"], "kept");
    }

    #[test]
    fn device_binding_overrides_site_level() {
        let file = sample();
        let site = &file.sites["lab"];
        let ap1 = MacAddress::parse("aa:bb:cc:dd:ee:01").unwrap();
        let ap2 = MacAddress::parse("aa:bb:cc:dd:ee:02").unwrap();
        let ap3 = MacAddress::parse("aa:bb:cc:dd:ee:03").unwrap();
        assert_eq!(site.effective_wlans(&ap1), vec!["corp"]);
        assert_eq!(site.effective_wlans(&ap2), vec!["guest"]);
        assert!(site.effective_wlans(&ap3).is_empty());
    }

    #[test]
    fn invalid_device_mac_fails_to_parse() {
        let result: Result<ConfigFile, _> = serde_json::from_value(json!({
            "sites": { "lab": { "devices": { "ap": { "nope": {} } } } }
        }));
        assert!(result.is_err());
    }
}
