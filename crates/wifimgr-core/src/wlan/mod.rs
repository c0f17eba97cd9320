// ── WLAN reconciler ──
//
// Turns the WLAN labels a site references into vendor-specific WLAN
// payloads, decides create / update / no-op per SSID, and derives the
// per-AP tag set that tag-model vendors need in the device phase.

pub mod fingerprint;
pub mod tags;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{ConfigDoc, MacAddress, SiteConfiguration, Vendor, WlanRecord};
use crate::source::{TemplateStore, VendorClient};

pub use fingerprint::{WlanFingerprint, WlanScope};
pub use tags::{ApTagMapping, WLAN_TAG_PREFIX, merge_ap_tags, wlan_tag};

// ── Label collection & validation ───────────────────────────────────

/// Every WLAN label the site references: create-list first, then site-level
/// bindings, then per-device bindings. Deduplicated, first-seen order.
pub fn collect_labels(site: &SiteConfiguration) -> Vec<String> {
    let mut seen = HashSet::new();
    let device_labels = site
        .devices
        .ap
        .keys()
        .filter_map(|mac| site.device_wlan_binding(mac))
        .flatten();
    site.profiles
        .wlan
        .iter()
        .cloned()
        .chain(site.wlan.iter().cloned())
        .chain(device_labels)
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

/// Check every reference before anything is expanded.
///
/// Site- and device-level labels must appear in the create-list; every
/// create-list entry needs a template that expands to an SSID for this
/// vendor. All violations are reported together.
pub fn validate_references(
    site: &SiteConfiguration,
    templates: &dyn TemplateStore,
    vendor: Vendor,
) -> Result<(), CoreError> {
    let create: HashSet<&str> = site.profiles.wlan.iter().map(String::as_str).collect();
    let mut violations = Vec::new();

    for label in &site.wlan {
        if !create.contains(label.as_str()) {
            violations.push(format!(
                "site-level WLAN '{label}' is not listed in profiles.wlan"
            ));
        }
    }
    for mac in site.devices.ap.keys() {
        for label in site.device_wlan_binding(mac).unwrap_or_default() {
            if !create.contains(label.as_str()) {
                violations.push(format!(
                    "device {mac}: WLAN '{label}' is not listed in profiles.wlan"
                ));
            }
        }
    }
    for label in &site.profiles.wlan {
        match templates.wlan_template(label) {
            None => violations.push(format!("WLAN template '{label}' not found")),
            Some(template) => {
                if !template.expand(vendor).contains_key("ssid") {
                    violations.push(format!("WLAN template '{label}' has no ssid for {vendor}"));
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(CoreError::WlanValidation { violations })
    }
}

/// Label → APs that should broadcast it. An AP with its own `wlan` list
/// gets exactly that list; every other AP inherits the site-level list.
pub fn ap_assignments(site: &SiteConfiguration) -> BTreeMap<String, BTreeSet<MacAddress>> {
    let mut map: BTreeMap<String, BTreeSet<MacAddress>> = collect_labels(site)
        .into_iter()
        .map(|label| (label, BTreeSet::new()))
        .collect();
    for mac in site.devices.ap.keys() {
        for label in site.effective_wlans(mac) {
            map.entry(label).or_default().insert(mac.clone());
        }
    }
    map
}

/// A label is broadcast site-wide when it is bound at site level and no
/// configured AP opts out through its own list.
fn is_site_wide(site: &SiteConfiguration, label: &str) -> bool {
    site.wlan.iter().any(|l| l == label)
        && site
            .devices
            .ap
            .keys()
            .all(|mac| site.effective_wlans(mac).iter().any(|l| l == label))
}

// ── Desired WLANs ───────────────────────────────────────────────────

/// A fully expanded, vendor-scoped WLAN payload.
#[derive(Debug, Clone, Serialize)]
pub struct DesiredWlan {
    pub label: String,
    pub ssid: String,
    pub config: ConfigDoc,
}

/// Everything the WLAN phase hands on to the device phase.
#[derive(Debug, Clone, Default)]
pub struct DesiredWlans {
    pub wlans: Vec<DesiredWlan>,
    pub tag_mapping: ApTagMapping,
    pub warnings: Vec<String>,
}

/// Expand every create-list template for the vendor and attach its scope.
///
/// `ap_ids` resolves AP MACs to vendor device IDs for ID-list scoping;
/// APs without a known ID are reported and left out of the list.
pub fn desired_wlans(
    site: &SiteConfiguration,
    templates: &dyn TemplateStore,
    vendor: Vendor,
    ap_ids: &HashMap<MacAddress, String>,
) -> DesiredWlans {
    let assignments = ap_assignments(site);
    let mut out = DesiredWlans::default();

    for label in &site.profiles.wlan {
        let Some(template) = templates.wlan_template(label) else {
            continue;
        };
        let mut config = template.expand(vendor);
        let Some(ssid) = config.get("ssid").and_then(Value::as_str).map(str::to_owned) else {
            continue;
        };
        let aps = assignments.get(label).cloned().unwrap_or_default();

        match vendor {
            Vendor::Mist => {
                if !is_site_wide(site, label) && !aps.is_empty() {
                    let mut ids = Vec::new();
                    for mac in &aps {
                        match ap_ids.get(mac) {
                            Some(id) => ids.push(id.clone()),
                            None => out.warnings.push(format!(
                                "WLAN '{label}': AP {mac} has no device ID yet and is not in ap_ids"
                            )),
                        }
                    }
                    ids.sort();
                    config.insert("apply_to".into(), json!("aps"));
                    config.insert("ap_ids".into(), json!(ids));
                } else {
                    config.insert("apply_to".into(), json!("site"));
                    config.shift_remove("ap_ids");
                }
            }
            Vendor::Meraki => {
                config.insert("available_on_all_aps".into(), json!(false));
                config.insert("availability_tags".into(), json!([wlan_tag(label)]));
                out.tag_mapping.insert(label, aps);
            }
        }

        debug!(label = %label, ssid = %ssid, %vendor, "expanded WLAN template");
        out.wlans.push(DesiredWlan {
            label: label.clone(),
            ssid,
            config,
        });
    }
    out
}

// ── Planning ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WlanAction {
    Create,
    Update { wlan_id: String },
    Unchanged { wlan_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WlanChange {
    pub label: String,
    pub ssid: String,
    #[serde(flatten)]
    pub action: WlanAction,
    #[serde(skip)]
    pub config: ConfigDoc,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WlanPlan {
    pub changes: Vec<WlanChange>,
}

impl WlanPlan {
    pub fn pending(&self) -> impl Iterator<Item = &WlanChange> {
        self.changes
            .iter()
            .filter(|c| !matches!(c.action, WlanAction::Unchanged { .. }))
    }

    pub fn is_noop(&self) -> bool {
        self.pending().next().is_none()
    }
}

/// Decide create / update / no-op per SSID. `force` turns every existing
/// match into an update.
pub fn plan(
    desired: &[DesiredWlan],
    existing: &[WlanRecord],
    vendor: Vendor,
    force: bool,
) -> WlanPlan {
    let by_ssid: HashMap<&str, &WlanRecord> =
        existing.iter().filter_map(|w| Some((w.ssid()?, w))).collect();

    let changes = desired
        .iter()
        .map(|want| {
            let action = match by_ssid.get(want.ssid.as_str()) {
                None => WlanAction::Create,
                Some(have) => {
                    let same = WlanFingerprint::of(&have.config, vendor)
                        == WlanFingerprint::of(&want.config, vendor);
                    if same && !force {
                        WlanAction::Unchanged {
                            wlan_id: have.id.clone(),
                        }
                    } else {
                        WlanAction::Update {
                            wlan_id: have.id.clone(),
                        }
                    }
                }
            };
            WlanChange {
                label: want.label.clone(),
                ssid: want.ssid.clone(),
                action,
                config: want.config.clone(),
            }
        })
        .collect();
    WlanPlan { changes }
}

/// Result of executing a plan: SSIDs per action, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WlanOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
}

impl WlanOutcome {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty()
    }
}

/// Execute the pending changes of a plan against the vendor.
pub async fn apply_plan(
    client: &dyn VendorClient,
    site_id: &str,
    plan: &WlanPlan,
) -> Result<WlanOutcome, CoreError> {
    let mut outcome = WlanOutcome::default();
    for change in plan.pending() {
        match &change.action {
            WlanAction::Create => {
                let created = client.create_wlan(site_id, &change.config).await?;
                info!(ssid = %change.ssid, wlan_id = %created.id, "created WLAN");
                outcome.created.push(change.ssid.clone());
            }
            WlanAction::Update { wlan_id } => {
                client.update_wlan(site_id, wlan_id, &change.config).await?;
                info!(ssid = %change.ssid, wlan_id = %wlan_id, "updated WLAN");
                outcome.updated.push(change.ssid.clone());
            }
            WlanAction::Unchanged { .. } => {}
        }
    }
    outcome.created.sort();
    outcome.updated.sort();
    Ok(outcome)
}

/// Guard for vendors without WLAN support.
pub fn ensure_wlan_capable(client: &dyn VendorClient, api_label: &str) -> Result<(), CoreError> {
    if client.supports_wlans() {
        Ok(())
    } else {
        warn!(api = api_label, "API does not support WLAN management");
        Err(CoreError::Unsupported {
            operation: format!("WLAN management on API '{api_label}'"),
            required: "a vendor API with WLAN support".into(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::{MemoryTemplateStore, MemoryVendor};
    use crate::model::{ConfigFile, WlanTemplate};
    use pretty_assertions::assert_eq;

    fn site(value: Value) -> SiteConfiguration {
        let file: ConfigFile =
            serde_json::from_value(json!({ "sites": { "lab": value } })).unwrap();
        file.sites["lab"].clone()
    }

    fn templates() -> MemoryTemplateStore {
        let t = |label: &str, body: Value| {
            WlanTemplate::new(label, body.as_object().unwrap().clone())
        };
        MemoryTemplateStore::new()
            .with_template(t(
                "corp",
                json!({ "ssid": "Corp", "vlan_id": 10, "auth": { "type": "psk" } }),
            ))
            .with_template(t("guest", json!({ "ssid": "Guest", "auth": { "type": "open" } })))
            .with_template(t("iot", json!({ "meraki": { "ssid": "IoT" } })))
    }

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    #[test]
    fn labels_are_deduplicated_in_first_seen_order() {
        let s = site(json!({
            "wlan": ["corp", "lab"],
            "profiles": { "wlan": ["guest", "corp"] },
            "devices": { "ap": {
                "aa:bb:cc:dd:ee:01": { "wlan": ["iot", "guest"] },
                "aa:bb:cc:dd:ee:02": {}
            } }
        }));
        assert_eq!(collect_labels(&s), vec!["guest", "corp", "lab", "iot"]);
    }

    #[test]
    fn validation_reports_every_violation() {
        let s = site(json!({
            "wlan": ["corp", "lab"],
            "profiles": { "wlan": ["corp", "missing", "iot"] },
            "devices": { "ap": { "aa:bb:cc:dd:ee:01": { "wlan": ["cafe"] } } }
        }));
        let err = validate_references(&s, &templates(), Vendor::Mist).unwrap_err();
        let CoreError::WlanValidation { violations } = err else {
            panic!("expected WlanValidation");
        };
        assert_eq!(
            violations,
            vec![
                "site-level WLAN 'lab' is not listed in profiles.wlan".to_string(),
                "device aa:bb:cc:dd:ee:01: WLAN 'cafe' is not listed in profiles.wlan".to_string(),
                "WLAN template 'missing' not found".to_string(),
                "WLAN template 'iot' has no ssid for mist".to_string(),
            ]
        );
        assert!(validate_references(&s, &templates(), Vendor::Meraki).is_err());
    }

    #[test]
    fn device_binding_overrides_inheritance() {
        let s = site(json!({
            "wlan": ["corp"],
            "profiles": { "wlan": ["corp", "guest"] },
            "devices": { "ap": {
                "aa:bb:cc:dd:ee:01": { "wlan": ["guest"] },
                "aa:bb:cc:dd:ee:02": {}
            } }
        }));
        let map = ap_assignments(&s);
        assert_eq!(map["corp"], BTreeSet::from([mac("aa:bb:cc:dd:ee:02")]));
        assert_eq!(map["guest"], BTreeSet::from([mac("aa:bb:cc:dd:ee:01")]));
    }

    #[test]
    fn mist_subset_uses_ap_ids_and_site_wide_broadcasts() {
        let s = site(json!({
            "wlan": ["corp"],
            "profiles": { "wlan": ["corp", "guest"] },
            "devices": { "ap": {
                "aa:bb:cc:dd:ee:01": { "wlan": ["corp", "guest"] },
                "aa:bb:cc:dd:ee:02": {}
            } }
        }));
        let ids = HashMap::from([(mac("aa:bb:cc:dd:ee:01"), "dev-1".to_string())]);
        let desired = desired_wlans(&s, &templates(), Vendor::Mist, &ids);
        let corp = &desired.wlans[0].config;
        let guest = &desired.wlans[1].config;
        assert_eq!(corp["apply_to"], "site");
        assert!(corp.get("ap_ids").is_none());
        assert_eq!(guest["apply_to"], "aps");
        assert_eq!(guest["ap_ids"], json!(["dev-1"]));
        assert!(desired.tag_mapping.is_empty());
    }

    #[test]
    fn meraki_guest_scoped_by_tag() {
        let s = site(json!({
            "profiles": { "wlan": ["guest"] },
            "devices": { "ap": {
                "aa:bb:cc:dd:ee:01": { "wlan": ["guest"] },
                "aa:bb:cc:dd:ee:02": {}
            } }
        }));
        let desired = desired_wlans(&s, &templates(), Vendor::Meraki, &HashMap::new());
        let guest = &desired.wlans[0].config;
        assert_eq!(guest["available_on_all_aps"], false);
        assert_eq!(guest["availability_tags"], json!(["wifimgr-wlan-guest"]));
        assert_eq!(
            desired.tag_mapping.ap_tags(),
            BTreeMap::from([(mac("aa:bb:cc:dd:ee:01"), vec!["wifimgr-wlan-guest".to_string()])])
        );
    }

    #[tokio::test]
    async fn second_run_performs_no_writes() {
        let s = site(json!({
            "wlan": ["corp"],
            "profiles": { "wlan": ["corp"] },
            "devices": { "ap": { "aa:bb:cc:dd:ee:01": {} } }
        }));
        let vendor = MemoryVendor::new(Vendor::Mist);
        let desired = desired_wlans(&s, &templates(), Vendor::Mist, &HashMap::new());

        let existing = vendor.list_wlans("s1").await.unwrap();
        let first = plan(&desired.wlans, &existing, Vendor::Mist, false);
        let outcome = apply_plan(&vendor, "s1", &first).await.unwrap();
        assert_eq!(outcome.created, vec!["Corp"]);

        let existing = vendor.list_wlans("s1").await.unwrap();
        let second = plan(&desired.wlans, &existing, Vendor::Mist, false);
        assert!(second.is_noop());
        apply_plan(&vendor, "s1", &second).await.unwrap();
        assert_eq!(vendor.calls().await.len(), 1);

        let existing = vendor.list_wlans("s1").await.unwrap();
        let forced = plan(&desired.wlans, &existing, Vendor::Mist, true);
        assert!(matches!(forced.changes[0].action, WlanAction::Update { .. }));
    }

    #[test]
    fn drifted_vlan_triggers_update() {
        let desired = vec![DesiredWlan {
            label: "corp".into(),
            ssid: "Corp".into(),
            config: json!({ "ssid": "Corp", "vlan_id": 10 }).as_object().unwrap().clone(),
        }];
        let existing = vec![WlanRecord {
            id: "w1".into(),
            config: json!({ "ssid": "Corp", "vlan_id": 20 }).as_object().unwrap().clone(),
        }];
        let p = plan(&desired, &existing, Vendor::Mist, false);
        assert_eq!(p.changes[0].action, WlanAction::Update { wlan_id: "w1".into() });
    }

    #[test]
    fn capability_mismatch_is_configuration_error() {
        let vendor = MemoryVendor::new(Vendor::Meraki).without_wlan_support();
        let err = ensure_wlan_capable(&vendor, "meraki-prod").unwrap_err();
        assert!(err.is_configuration());
    }
}
