// ── Access-point specifics ──

use serde_json::Value;

use crate::model::{ConfigDoc, WLAN_BINDING_KEY};
use crate::wlan::merge_ap_tags;

/// Field holding an AP's tag list.
pub const TAGS_KEY: &str = "tags";

/// Site-file fields that describe bindings rather than device settings.
pub const BINDING_KEYS: &[&str] = &[WLAN_BINDING_KEY];

/// Live-only fields reported by the controller.
pub const STATUS_KEYS: &[&str] = &[
    "num_clients",
    "radio_stat",
    "power_src",
    "lldp_stat",
    "ext_ip",
];

/// Replace the desired tag list with the merge of user tags, live tags and
/// the tool-owned WLAN tags this AP requires.
pub fn inject_wlan_tags(desired: &mut ConfigDoc, current: &ConfigDoc, required: &[String]) {
    let user = desired.get(TAGS_KEY).map(string_list);
    let live = current.get(TAGS_KEY).map(string_list).unwrap_or_default();
    let merged = merge_ap_tags(user.as_deref(), &live, required);
    desired.insert(
        TAGS_KEY.to_owned(),
        Value::Array(merged.into_iter().map(Value::String).collect()),
    );
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}
