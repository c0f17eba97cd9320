// ── WLAN templates and live WLAN records ──

use serde::{Deserialize, Serialize};

use super::ConfigDoc;
use super::device::Vendor;
use crate::managed_keys::deep_merge;

/// Keys that hold vendor-specific override blocks inside a template.
const VENDOR_BLOCKS: [Vendor; 2] = [Vendor::Mist, Vendor::Meraki];

/// A named, vendor-neutral WLAN template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WlanTemplate {
    pub label: String,
    pub body: ConfigDoc,
}

impl WlanTemplate {
    pub fn new(label: impl Into<String>, body: ConfigDoc) -> Self {
        Self {
            label: label.into(),
            body,
        }
    }

    /// Expand for one vendor: vendor-neutral fields overlaid with that
    /// vendor's override block. Every vendor block is dropped from the result.
    pub fn expand(&self, vendor: Vendor) -> ConfigDoc {
        let mut expanded = self.body.clone();
        let mut overrides = None;
        for candidate in VENDOR_BLOCKS {
            let block = expanded.shift_remove(candidate.as_ref());
            if candidate == vendor {
                overrides = block;
            }
        }
        if let Some(serde_json::Value::Object(block)) = overrides {
            deep_merge(&mut expanded, &block);
        }
        expanded
    }
}

/// A WLAN as it currently exists at a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WlanRecord {
    pub id: String,
    #[serde(flatten)]
    pub config: ConfigDoc,
}

impl WlanRecord {
    pub fn ssid(&self) -> Option<&str> {
        self.config.get("ssid").and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template() -> WlanTemplate {
        let body = json!({
            "ssid": "Corp",
            "enabled": true,
            "vlan_id": 10,
            "auth": { "type": "psk", "psk": "secret" },
            "mist": { "auth": { "pairwise": ["wpa2-ccmp"] }, "roam_mode": "11r" },
            "meraki": { "vlan_id": 20, "splash_page": "None" }
        });
        WlanTemplate::new("corp", body.as_object().unwrap().clone())
    }

    #[test]
    fn expand_merges_vendor_block_and_drops_others() {
        let expanded = template().expand(Vendor::Mist);
        assert_eq!(
            serde_json::Value::Object(expanded),
            json!({
                "ssid": "Corp",
                "enabled": true,
                "vlan_id": 10,
                "auth": { "type": "psk", "psk": "secret", "pairwise": ["wpa2-ccmp"] },
                "roam_mode": "11r"
            })
        );
    }

    #[test]
    fn expand_for_meraki_overrides_scalar() {
        let expanded = template().expand(Vendor::Meraki);
        assert_eq!(expanded["vlan_id"], 20);
        assert!(expanded.get("mist").is_none());
        assert!(expanded.get("roam_mode").is_none());
    }
}
