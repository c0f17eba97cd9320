// ── Device updater ──
//
// Computes and applies device-level changes for one (site, device type)
// pair. The three device families share one implementation; per-type
// behaviour is a match on `DeviceType` into the `ap`, `switch` and
// `gateway` modules. Every mutation is preceded by the dual-inventory gate.

pub mod alias;
pub mod ap;
pub mod gateway;
pub mod switch;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch_loader::DeviceBatchLoader;
use crate::error::{CoreError, DeviceFailure};
use crate::inventory::{InventoryChecker, InventoryStatus};
use crate::managed_keys::{self, ManagedKeySpec};
use crate::model::{ConfigDoc, DeviceState, DeviceType, MacAddress, SiteConfiguration};
use crate::source::VendorClient;
use crate::wlan::ApTagMapping;

pub use alias::AliasResolver;

/// Command that restores the previous site file after a partial failure.
pub fn rollback_command(site_name: &str) -> String {
    format!("wifimgr apply rollback {site_name}")
}

/// Site-file fields that are bindings, not device settings.
pub fn binding_keys(device_type: DeviceType) -> &'static [&'static str] {
    match device_type {
        DeviceType::Ap => ap::BINDING_KEYS,
        DeviceType::Switch => switch::BINDING_KEYS,
        DeviceType::Gateway => gateway::BINDING_KEYS,
    }
}

/// Live-only fields never compared.
pub fn status_keys(device_type: DeviceType) -> &'static [&'static str] {
    match device_type {
        DeviceType::Ap => ap::STATUS_KEYS,
        DeviceType::Switch => switch::STATUS_KEYS,
        DeviceType::Gateway => gateway::STATUS_KEYS,
    }
}

// ── BatchResult ─────────────────────────────────────────────────────

/// Outcome of a best-effort update batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<MacAddress>,
    pub unchanged: Vec<MacAddress>,
    pub failed: Vec<DeviceFailure>,
}

impl BatchResult {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.unchanged.len() + self.failed.len()
    }

    fn fail(&mut self, mac: &MacAddress, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(mac = %mac, reason = %reason, "device update failed");
        self.failed.push(DeviceFailure {
            mac: mac.to_string(),
            reason,
        });
    }

    /// Fold into one aggregate error when any device failed.
    pub fn into_result(self, site_name: &str) -> Result<Vec<MacAddress>, CoreError> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }
        Err(CoreError::PartialUpdate {
            attempted: self.attempted(),
            failures: self.failed,
            rollback_command: rollback_command(site_name),
        })
    }
}

// ── DeviceUpdater ───────────────────────────────────────────────────

pub struct DeviceUpdater<'a> {
    device_type: DeviceType,
    site: &'a SiteConfiguration,
    inventory: &'a InventoryChecker,
    loader: &'a DeviceBatchLoader,
    aliases: &'a AliasResolver,
    managed_keys: ManagedKeySpec,
    ap_tags: Option<&'a ApTagMapping>,
}

impl<'a> DeviceUpdater<'a> {
    /// Device type and site ID come from the batch loader.
    pub fn new(
        site: &'a SiteConfiguration,
        inventory: &'a InventoryChecker,
        loader: &'a DeviceBatchLoader,
        aliases: &'a AliasResolver,
    ) -> Self {
        Self {
            device_type: loader.device_type(),
            site,
            inventory,
            loader,
            aliases,
            managed_keys: ManagedKeySpec::default(),
            ap_tags: None,
        }
    }

    /// An empty key list means full ownership.
    #[must_use]
    pub fn with_managed_keys(mut self, spec: ManagedKeySpec) -> Self {
        self.managed_keys = spec;
        self
    }

    /// Inject tag-model WLAN tags into AP payloads.
    #[must_use]
    pub fn with_ap_tags(mut self, mapping: &'a ApTagMapping) -> Self {
        if self.device_type == DeviceType::Ap {
            self.managed_keys = self.managed_keys.with_owned_key(ap::TAGS_KEY);
            self.ap_tags = Some(mapping);
        }
        self
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn site_id(&self) -> &str {
        self.loader.site_id()
    }

    // ── Device sets ──

    /// MACs declared in the site file for this type, sorted.
    pub fn configured_devices(&self) -> Vec<MacAddress> {
        let mut macs: Vec<MacAddress> = self
            .site
            .devices
            .of_type(self.device_type)
            .keys()
            .cloned()
            .collect();
        macs.sort();
        macs
    }

    /// MACs currently assigned to the site, sorted.
    pub async fn assigned_devices(&self) -> Vec<MacAddress> {
        self.loader.assigned_macs().await
    }

    pub fn find_devices_inventory_status(&self, configured: &[MacAddress]) -> InventoryStatus {
        self.inventory.status_of(configured)
    }

    /// Configured devices that are unassigned or assigned elsewhere, limited
    /// to devices present in both inventories.
    pub fn find_devices_to_assign(&self, configured: &[MacAddress]) -> Vec<MacAddress> {
        let site_id = self.site_id();
        let mut macs: Vec<MacAddress> = configured
            .iter()
            .filter(|mac| self.inventory.is_in_inventory(mac))
            .filter(|mac| {
                self.inventory
                    .site_assignment(mac)
                    .is_none_or(|assignment| assignment.site_id != site_id)
            })
            .cloned()
            .collect();
        macs.sort();
        macs
    }

    /// Assigned devices the site file no longer declares. Devices outside
    /// the dual inventory are left alone.
    pub async fn find_devices_to_unassign(&self) -> Vec<MacAddress> {
        let configured = self.site.devices.of_type(self.device_type);
        let mut macs = Vec::new();
        for mac in self.loader.assigned_macs().await {
            if configured.contains_key(&mac) {
                continue;
            }
            if self.inventory.is_in_inventory(&mac) {
                macs.push(mac);
            } else {
                debug!(
                    mac = %mac,
                    device_type = %self.device_type,
                    "not unassigning device outside inventory"
                );
            }
        }
        macs
    }

    /// Devices whose live config diverges from the site file. Devices not
    /// yet assigned to the site are skipped; devices whose desired config
    /// cannot be prepared are kept so the update phase reports them.
    pub async fn find_devices_to_update(&self, candidates: &[MacAddress]) -> Vec<MacAddress> {
        let mut macs = Vec::new();
        for mac in candidates {
            let Ok(state) = self.loader.device_by_mac(mac).await else {
                debug!(mac = %mac, "device not assigned to site; skipping diff");
                continue;
            };
            match self.plan_update(&state) {
                Ok(Some(_)) | Err(_) => macs.push(mac.clone()),
                Ok(None) => {}
            }
        }
        macs.sort();
        macs
    }

    // ── Payloads ──

    /// Desired settings for one device, bindings removed.
    pub fn device_config_from_site(&self, mac: &MacAddress) -> Option<ConfigDoc> {
        let raw = self.site.devices.of_type(self.device_type).get(mac)?;
        let bindings = binding_keys(self.device_type);
        Some(
            raw.iter()
                .filter(|(k, _)| !bindings.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Full desired document: site settings, translated aliases and, for
    /// tag-model APs, the merged tag list.
    pub fn desired_config(&self, state: &DeviceState) -> Result<ConfigDoc, String> {
        let raw = self
            .device_config_from_site(&state.mac)
            .ok_or_else(|| "device is not declared in the site configuration".to_owned())?;
        let mut desired = self.aliases.translate(&raw)?;
        if let Some(mapping) = self.ap_tags {
            ap::inject_wlan_tags(&mut desired, &state.config, &mapping.required_tags(&state.mac));
        }
        Ok(desired)
    }

    /// The payload to send, or `None` when the device is in sync.
    pub fn plan_update(&self, state: &DeviceState) -> Result<Option<ConfigDoc>, String> {
        let desired = self.desired_config(state)?;
        let status = status_keys(self.device_type);
        let current: ConfigDoc = state
            .config
            .iter()
            .filter(|(k, _)| !status.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !managed_keys::compare(&current, &desired, &self.managed_keys) {
            return Ok(None);
        }
        let payload = managed_keys::filter_by_managed_keys(&desired, &self.managed_keys);
        Ok((!payload.is_empty()).then_some(payload))
    }

    // ── Mutations ──

    /// Re-check every target against both inventories. Any miss aborts.
    pub fn ensure_in_inventory(&self, macs: &[MacAddress]) -> Result<(), CoreError> {
        let mut violations: Vec<String> = macs
            .iter()
            .filter(|mac| !self.inventory.is_in_inventory(mac))
            .map(ToString::to_string)
            .collect();
        if violations.is_empty() {
            return Ok(());
        }
        violations.sort();
        warn!(device_type = %self.device_type, count = violations.len(), "safety gate violation");
        Err(CoreError::SafetyGate { macs: violations })
    }

    pub async fn assign_devices(
        &self,
        client: &dyn VendorClient,
        macs: &[MacAddress],
    ) -> Result<(), CoreError> {
        if macs.is_empty() {
            return Ok(());
        }
        self.ensure_in_inventory(macs)?;
        client.assign_devices(self.site_id(), macs).await?;
        info!(
            site_id = self.site_id(),
            device_type = %self.device_type,
            count = macs.len(),
            "assigned devices"
        );
        Ok(())
    }

    pub async fn unassign_devices(
        &self,
        client: &dyn VendorClient,
        macs: &[MacAddress],
    ) -> Result<(), CoreError> {
        if macs.is_empty() {
            return Ok(());
        }
        self.ensure_in_inventory(macs)?;
        client.unassign_devices(macs).await?;
        info!(
            site_id = self.site_id(),
            device_type = %self.device_type,
            count = macs.len(),
            "unassigned devices"
        );
        Ok(())
    }

    /// Update every target, one at a time, even after failures.
    ///
    /// The safety gate runs first over the whole batch; a violation aborts
    /// before any device is touched.
    pub async fn update_device_configurations(
        &self,
        client: &dyn VendorClient,
        macs: &[MacAddress],
    ) -> Result<BatchResult, CoreError> {
        self.ensure_in_inventory(macs)?;

        let mut result = BatchResult::default();
        let mut targets = macs.to_vec();
        targets.sort();
        for mac in &targets {
            let state = match self.loader.device_by_mac(mac).await {
                Ok(state) => state,
                Err(e) => {
                    result.fail(mac, e.to_string());
                    continue;
                }
            };
            let payload = match self.plan_update(&state) {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    result.unchanged.push(mac.clone());
                    continue;
                }
                Err(reason) => {
                    result.fail(mac, reason);
                    continue;
                }
            };
            match client
                .update_device(self.site_id(), &state.id, self.device_type, &payload)
                .await
            {
                Ok(()) => {
                    info!(
                        mac = %mac,
                        device_id = %state.id,
                        device_type = %self.device_type,
                        "updated device"
                    );
                    result.succeeded.push(mac.clone());
                }
                Err(e) => result.fail(mac, e.to_string()),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::{MemoryVendor, VendorCall};
    use crate::model::{ConfigFile, InventoryEntry, Vendor};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    fn site() -> SiteConfiguration {
        let file: ConfigFile = serde_json::from_value(json!({ "sites": { "lab": {
            "wlan": ["corp"],
            "devices": { "ap": {
                "aa:bb:cc:dd:ee:01": { "name": "ap-1", "wlan": ["corp"],
                    "radio_config": { "band_5": { "power": 17 } } },
                "aa:bb:cc:dd:ee:02": { "name": "ap-2" },
                "aa:bb:cc:dd:ee:03": { "name": "ap-3" }
            } }
        } } }))
        .unwrap();
        file.sites["lab"].clone()
    }

    fn inventory() -> InventoryChecker {
        let entry = |m: &str, site: Option<&str>| InventoryEntry {
            mac: m.into(),
            site_id: site.map(Into::into),
            site_name: site.map(|_| "lab".into()),
        };
        InventoryChecker::from_parts(
            DeviceType::Ap,
            vec![
                entry("aa:bb:cc:dd:ee:01", Some("s1")),
                entry("aa:bb:cc:dd:ee:02", None),
                entry("aa:bb:cc:dd:ee:04", Some("s1")),
                entry("aa:bb:cc:dd:ee:05", Some("s1")),
            ],
            vec![
                mac("aa:bb:cc:dd:ee:01"),
                mac("aa:bb:cc:dd:ee:02"),
                mac("aa:bb:cc:dd:ee:03"),
                mac("aa:bb:cc:dd:ee:04"),
            ],
        )
    }

    fn state(id: &str, m: &str, config: Value) -> DeviceState {
        DeviceState {
            mac: mac(m),
            id: id.into(),
            name: None,
            config: config.as_object().unwrap().clone(),
        }
    }

    fn loader() -> DeviceBatchLoader {
        DeviceBatchLoader::from_states(
            "s1",
            DeviceType::Ap,
            [
                state(
                    "d1",
                    "aa:bb:cc:dd:ee:01",
                    json!({ "name": "ap-1", "num_clients": 4,
                        "radio_config": { "band_5": { "power": 10 } } }),
                ),
                state("d4", "aa:bb:cc:dd:ee:04", json!({ "name": "old" })),
                state("d5", "aa:bb:cc:dd:ee:05", json!({ "name": "foreign" })),
            ],
        )
    }

    #[tokio::test]
    async fn device_sets() {
        let site = site();
        let inv = inventory();
        let loader = loader();
        let aliases = AliasResolver::default();
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases);

        let configured = updater.configured_devices();
        assert_eq!(configured.len(), 3);
        assert_eq!(updater.find_devices_to_assign(&configured), vec![mac("aa:bb:cc:dd:ee:02")]);
        // ee:05 is assigned but absent from the local allowlist.
        assert_eq!(updater.find_devices_to_unassign().await, vec![mac("aa:bb:cc:dd:ee:04")]);

        let status = updater.find_devices_inventory_status(&configured);
        assert_eq!(status.not_in_api, vec![mac("aa:bb:cc:dd:ee:03")]);
    }

    #[tokio::test]
    async fn only_managed_divergence_is_updated() {
        let site = site();
        let inv = inventory();
        let loader = loader();
        let aliases = AliasResolver::default();
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases)
            .with_managed_keys(ManagedKeySpec::new(["radio_config.band_5.power"]));

        let targets = updater.find_devices_to_update(&updater.configured_devices()).await;
        assert_eq!(targets, vec![mac("aa:bb:cc:dd:ee:01")]);

        let vendor = MemoryVendor::new(Vendor::Mist);
        let result = updater.update_device_configurations(&vendor, &targets).await.unwrap();
        assert_eq!(result.succeeded, targets);
        let calls = vendor.calls().await;
        let VendorCall::UpdateDevice { device_id, payload, .. } = &calls[0] else {
            panic!("expected device update");
        };
        assert_eq!(device_id, "d1");
        assert_eq!(
            Value::Object(payload.clone()),
            json!({ "radio_config": { "band_5": { "power": 17 } } })
        );
    }

    #[tokio::test]
    async fn binding_keys_are_not_device_settings() {
        let site = site();
        let inv = inventory();
        let loader = loader();
        let aliases = AliasResolver::default();
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases);
        let config = updater.device_config_from_site(&mac("aa:bb:cc:dd:ee:01")).unwrap();
        assert!(config.get("wlan").is_none());
        assert_eq!(config["name"], "ap-1");
    }

    #[tokio::test]
    async fn safety_gate_aborts_whole_batch() {
        let site = site();
        let inv = inventory();
        let loader = loader();
        let aliases = AliasResolver::default();
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases);
        let vendor = MemoryVendor::new(Vendor::Mist);

        let err = updater
            .update_device_configurations(
                &vendor,
                &[mac("aa:bb:cc:dd:ee:01"), mac("aa:bb:cc:dd:ee:05")],
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoreError::SafetyGate { ref macs } if macs == &["aa:bb:cc:dd:ee:05"])
        );
        assert!(vendor.calls().await.is_empty());

        let err = updater
            .assign_devices(&vendor, &[mac("aa:bb:cc:dd:ee:03")])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SafetyGate { .. }));
    }

    #[tokio::test]
    async fn failures_are_collected_and_every_device_attempted() {
        let aps = json!({
            "aa:bb:cc:dd:ee:01": { "name": "new-1" },
            "aa:bb:cc:dd:ee:04": { "name": "new-4" }
        });
        let file: ConfigFile =
            serde_json::from_value(json!({ "sites": { "lab": { "devices": { "ap": aps } } } }))
                .unwrap();
        let site = file.sites["lab"].clone();
        let inv = inventory();
        let loader = loader();
        let aliases = AliasResolver::default();
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases)
            .with_managed_keys(ManagedKeySpec::new(["name"]));
        let vendor = MemoryVendor::new(Vendor::Mist).failing_device("d1");

        let targets = vec![mac("aa:bb:cc:dd:ee:01"), mac("aa:bb:cc:dd:ee:04")];
        let result = updater.update_device_configurations(&vendor, &targets).await.unwrap();
        assert_eq!(result.succeeded, vec![mac("aa:bb:cc:dd:ee:04")]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(vendor.calls().await.len(), 1);

        let err = result.into_result("lab").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("aa:bb:cc:dd:ee:01"));
        assert!(text.contains("wifimgr apply rollback lab"));
    }

    #[tokio::test]
    async fn tag_model_ap_gets_merged_tags() {
        let aps = json!({
            "aa:bb:cc:dd:ee:01": { "name": "ap-1", "wlan": ["guest"] }
        });
        let file: ConfigFile =
            serde_json::from_value(json!({ "sites": { "lab": { "devices": { "ap": aps } } } }))
                .unwrap();
        let site = file.sites["lab"].clone();
        let inv = inventory();
        let loader = DeviceBatchLoader::from_states(
            "s1",
            DeviceType::Ap,
            [state("d1", "aa:bb:cc:dd:ee:01", json!({ "name": "ap-1", "tags": ["floor-3"] }))],
        );
        let aliases = AliasResolver::default();
        let mut mapping = ApTagMapping::new();
        mapping.insert("guest", [mac("aa:bb:cc:dd:ee:01")]);
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases)
            .with_managed_keys(ManagedKeySpec::new(["name"]))
            .with_ap_tags(&mapping);

        let current = loader.device_by_mac(&mac("aa:bb:cc:dd:ee:01")).await.unwrap();
        let payload = updater.plan_update(&current).unwrap().unwrap();
        assert_eq!(
            Value::Object(payload),
            json!({ "name": "ap-1", "tags": ["floor-3", "wifimgr-wlan-guest"] })
        );
    }

    #[tokio::test]
    async fn unresolved_alias_fails_only_that_device() {
        let aps = json!({
            "aa:bb:cc:dd:ee:01": { "deviceprofile_name": "ghost" },
            "aa:bb:cc:dd:ee:04": { "name": "renamed" }
        });
        let file: ConfigFile =
            serde_json::from_value(json!({ "sites": { "lab": { "devices": { "ap": aps } } } }))
                .unwrap();
        let site = file.sites["lab"].clone();
        let inv = inventory();
        let loader = loader();
        let aliases = AliasResolver::default();
        let updater = DeviceUpdater::new(&site, &inv, &loader, &aliases)
            .with_managed_keys(
                ManagedKeySpec::new(["name", "deviceprofile_name"]).with_alias_ids(),
            );
        let vendor = MemoryVendor::new(Vendor::Mist);

        let targets = updater.find_devices_to_update(&updater.configured_devices()).await;
        assert_eq!(targets.len(), 2);
        let result = updater.update_device_configurations(&vendor, &targets).await.unwrap();
        assert_eq!(result.failed[0].mac, "aa:bb:cc:dd:ee:01");
        assert!(result.failed[0].reason.contains("ghost"));
        assert_eq!(result.succeeded, vec![mac("aa:bb:cc:dd:ee:04")]);
    }
}
