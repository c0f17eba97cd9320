// ── Tag-model WLAN scoping ──
//
// Vendors without per-AP WLAN lists scope a WLAN by AP tag: the WLAN is
// made available only on APs carrying a matching tag. Each label gets a
// synthetic tag under a reserved prefix; tags under that prefix belong to
// this tool, everything else on the AP belongs to the operator.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::MacAddress;

/// Reserved prefix for tool-owned AP tags.
pub const WLAN_TAG_PREFIX: &str = "wifimgr-wlan-";

/// Synthetic availability tag for a WLAN label.
pub fn wlan_tag(label: &str) -> String {
    let slug: String = label
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("{WLAN_TAG_PREFIX}{slug}")
}

pub fn is_managed_tag(tag: &str) -> bool {
    tag.starts_with(WLAN_TAG_PREFIX)
}

/// Final tag list for one AP.
///
/// Start from the operator's explicit tag list when the site file declares
/// one, otherwise from the AP's live tags; drop every tool-owned tag; add
/// the tool-owned tags the AP now requires. Result is sorted and unique,
/// so applying it again with the same required set changes nothing.
pub fn merge_ap_tags(
    user: Option<&[String]>,
    current: &[String],
    required: &[String],
) -> Vec<String> {
    let base = user.unwrap_or(current);
    base.iter()
        .filter(|t| !is_managed_tag(t))
        .chain(required.iter())
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// WLAN label → APs that should broadcast it, plus the derived per-AP tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApTagMapping {
    by_label: BTreeMap<String, BTreeSet<MacAddress>>,
}

impl ApTagMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &str, aps: impl IntoIterator<Item = MacAddress>) {
        self.by_label
            .entry(label.to_owned())
            .or_default()
            .extend(aps);
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.values().all(BTreeSet::is_empty)
    }

    /// Sorted tool-owned tags an AP must carry.
    pub fn required_tags(&self, mac: &MacAddress) -> Vec<String> {
        self.by_label
            .iter()
            .filter(|(_, aps)| aps.contains(mac))
            .map(|(label, _)| wlan_tag(label))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// AP → required tags, for every AP that requires at least one.
    pub fn ap_tags(&self) -> BTreeMap<MacAddress, Vec<String>> {
        let aps: BTreeSet<&MacAddress> = self.by_label.values().flatten().collect();
        aps.into_iter()
            .map(|mac| (mac.clone(), self.required_tags(mac)))
            .collect()
    }
}
