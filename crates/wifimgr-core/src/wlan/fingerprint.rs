// ── WLAN existence test ──
//
// Two WLANs with the same SSID are considered in sync when the fields that
// change client-visible behaviour agree: enabled flag, bands, VLAN, auth
// type and pairwise ciphers, and the apply scope.

use serde_json::Value;

use crate::model::{ConfigDoc, Vendor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WlanScope {
    Site,
    Aps(Vec<String>),
    Tags { all_aps: bool, tags: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WlanFingerprint {
    pub enabled: bool,
    pub bands: Vec<String>,
    pub vlan: Option<String>,
    pub auth_type: Option<String>,
    pub pairwise: Vec<String>,
    pub scope: WlanScope,
}

impl WlanFingerprint {
    pub fn of(config: &ConfigDoc, vendor: Vendor) -> Self {
        let auth = config.get("auth").and_then(Value::as_object);
        Self {
            enabled: config.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            bands: bands(config),
            vlan: config.get("vlan_id").and_then(scalar_string),
            auth_type: auth
                .and_then(|a| a.get("type"))
                .and_then(scalar_string),
            pairwise: sorted_strings(auth.and_then(|a| a.get("pairwise"))),
            scope: scope(config, vendor),
        }
    }
}

fn bands(config: &ConfigDoc) -> Vec<String> {
    match config.get("bands") {
        Some(list @ Value::Array(_)) => sorted_strings(Some(list)),
        _ => config
            .get("band")
            .and_then(scalar_string)
            .into_iter()
            .collect(),
    }
}

fn scope(config: &ConfigDoc, vendor: Vendor) -> WlanScope {
    match vendor {
        Vendor::Mist => match config.get("apply_to").and_then(Value::as_str) {
            Some("aps") => WlanScope::Aps(sorted_strings(config.get("ap_ids"))),
            _ => WlanScope::Site,
        },
        Vendor::Meraki => WlanScope::Tags {
            all_aps: config
                .get("available_on_all_aps")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            tags: sorted_strings(config.get("availability_tags")),
        },
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_ascii_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn sorted_strings(value: Option<&Value>) -> Vec<String> {
    let mut items: Vec<String> = value
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(scalar_string).collect())
        .unwrap_or_default();
    items.sort();
    items.dedup();
    items
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ConfigDoc {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn order_and_case_do_not_matter() {
        let a = doc(json!({
            "ssid": "Corp", "bands": ["5", "24"], "vlan_id": 10,
            "auth": { "type": "PSK", "pairwise": ["wpa3", "wpa2-ccmp"] },
            "apply_to": "aps", "ap_ids": ["b", "a"]
        }));
        let b = doc(json!({
            "ssid": "Corp", "bands": ["24", "5"], "vlan_id": "10", "enabled": true,
            "auth": { "type": "psk", "pairwise": ["wpa2-ccmp", "wpa3"] },
            "apply_to": "aps", "ap_ids": ["a", "b"], "id": "ignored"
        }));
        assert_eq!(WlanFingerprint::of(&a, Vendor::Mist), WlanFingerprint::of(&b, Vendor::Mist));
    }

    #[test]
    fn scope_change_is_detected() {
        let site = doc(json!({ "ssid": "Corp", "apply_to": "site" }));
        let aps = doc(json!({ "ssid": "Corp", "apply_to": "aps", "ap_ids": ["a"] }));
        assert_ne!(
            WlanFingerprint::of(&site, Vendor::Mist),
            WlanFingerprint::of(&aps, Vendor::Mist)
        );
    }

    #[test]
    fn meraki_scope_uses_tags() {
        let tagged = doc(json!({
            "ssid": "Guest", "available_on_all_aps": false,
            "availability_tags": ["wifimgr-wlan-guest"]
        }));
        let broadcast = doc(json!({ "ssid": "Guest" }));
        assert_eq!(
            WlanFingerprint::of(&tagged, Vendor::Meraki).scope,
            WlanScope::Tags { all_aps: false, tags: vec!["wifimgr-wlan-guest".into()] }
        );
        assert_ne!(
            WlanFingerprint::of(&tagged, Vendor::Meraki),
            WlanFingerprint::of(&broadcast, Vendor::Meraki)
        );
    }
}
