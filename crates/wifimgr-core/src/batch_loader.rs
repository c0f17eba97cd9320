// ── Per-site device batch ──
//
// One pass over the cache per (site, device type). The diff phase and the
// update phase of the same run share one loader, so a device is looked up
// in O(1) instead of re-querying the cache per MAC.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{DeviceState, DeviceType, MacAddress};
use crate::source::DeviceCache;

#[derive(Debug)]
pub struct DeviceBatchLoader {
    site_id: String,
    device_type: DeviceType,
    devices: RwLock<HashMap<MacAddress, DeviceState>>,
}

impl DeviceBatchLoader {
    pub fn load(
        cache: &dyn DeviceCache,
        api_label: &str,
        site_id: &str,
        device_type: DeviceType,
    ) -> Self {
        let mut devices = HashMap::new();
        for cached in cache.site_devices(api_label, site_id, device_type) {
            match DeviceState::from_cached(&cached) {
                Some(state) => {
                    devices.insert(state.mac.clone(), state);
                }
                None => {
                    warn!(
                        id = %cached.id,
                        mac = %cached.mac,
                        "skipping cached device with invalid MAC"
                    );
                }
            }
        }
        debug!(site_id, %device_type, count = devices.len(), "device batch loaded");
        Self::from_states(site_id, device_type, devices.into_values())
    }

    pub fn from_states(
        site_id: impl Into<String>,
        device_type: DeviceType,
        states: impl IntoIterator<Item = DeviceState>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            device_type,
            devices: RwLock::new(states.into_iter().map(|s| (s.mac.clone(), s)).collect()),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Fails with `DeviceNotFound` when the device is not assigned to this
    /// site; callers treat that as "skip the diff", not as fatal.
    pub async fn device_by_mac(&self, mac: &MacAddress) -> Result<DeviceState, CoreError> {
        self.devices
            .read()
            .await
            .get(mac)
            .cloned()
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: mac.to_string(),
            })
    }

    /// Sorted MACs of every device assigned to the site.
    pub async fn assigned_macs(&self) -> Vec<MacAddress> {
        let mut macs: Vec<MacAddress> = self.devices.read().await.keys().cloned().collect();
        macs.sort();
        macs
    }

    /// Sorted copies of the device states for the given MACs (unknown MACs skipped).
    pub async fn states_for(&self, macs: &[MacAddress]) -> Vec<DeviceState> {
        let devices = self.devices.read().await;
        let mut states: Vec<DeviceState> =
            macs.iter().filter_map(|m| devices.get(m).cloned()).collect();
        states.sort_by(|a, b| a.mac.cmp(&b.mac));
        states
    }

    /// Every loaded device state, sorted by MAC.
    pub async fn snapshot(&self) -> Vec<DeviceState> {
        let mut states: Vec<DeviceState> = self.devices.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.mac.cmp(&b.mac));
        states
    }

    /// Add a device that joined the site after the batch was loaded, e.g.
    /// one assigned earlier in the same run. Replaces any existing state.
    pub async fn insert(&self, state: DeviceState) {
        debug!(site_id = %self.site_id, mac = %state.mac, "device added to batch");
        self.devices.write().await.insert(state.mac.clone(), state);
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::{ApiSnapshot, MemoryCache};
    use crate::model::CachedDevice;
    use serde_json::json;

    fn cache() -> MemoryCache {
        let device = |id: &str, mac: &str, site: &str, t: DeviceType| CachedDevice {
            id: id.into(),
            mac: mac.into(),
            name: Some(id.into()),
            site_id: site.into(),
            device_type: t,
            config: json!({ "name": id }).as_object().unwrap().clone(),
        };
        MemoryCache::new().with_api(
            "mist",
            ApiSnapshot {
                devices: vec![
                    device("d1", "aa:bb:cc:dd:ee:02", "s1", DeviceType::Ap),
                    device("d2", "aa:bb:cc:dd:ee:01", "s1", DeviceType::Ap),
                    device("d3", "aa:bb:cc:dd:ee:03", "s2", DeviceType::Ap),
                    device("d4", "aa:bb:cc:dd:ee:04", "s1", DeviceType::Switch),
                    device("d5", "broken", "s1", DeviceType::Ap),
                ],
                ..ApiSnapshot::default()
            },
        )
    }

    #[tokio::test]
    async fn loads_only_site_and_type() {
        let loader = DeviceBatchLoader::load(&cache(), "mist", "s1", DeviceType::Ap);
        assert_eq!(loader.len().await, 2);
        let macs: Vec<String> = loader
            .assigned_macs()
            .await
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(macs, vec!["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"]);
    }

    #[tokio::test]
    async fn missing_device_is_not_found() {
        let loader = DeviceBatchLoader::load(&cache(), "mist", "s1", DeviceType::Ap);
        let other = MacAddress::parse("aa:bb:cc:dd:ee:03").unwrap();
        let err = loader.device_by_mac(&other).await.unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound { .. }));

        let known = MacAddress::parse("aa:bb:cc:dd:ee:01").unwrap();
        let state = loader.device_by_mac(&known).await.unwrap();
        assert_eq!(state.id, "d2");
        assert_eq!(state.config["name"], "d2");
    }

    #[tokio::test]
    async fn inserted_device_is_visible_to_lookups() {
        let loader = DeviceBatchLoader::load(&cache(), "mist", "s1", DeviceType::Ap);
        let moved = MacAddress::parse("aa:bb:cc:dd:ee:03").unwrap();
        assert!(loader.device_by_mac(&moved).await.is_err());

        loader
            .insert(DeviceState {
                mac: moved.clone(),
                id: "d3".into(),
                name: None,
                config: json!({ "name": "d3" }).as_object().unwrap().clone(),
            })
            .await;

        assert_eq!(loader.device_by_mac(&moved).await.unwrap().id, "d3");
        assert_eq!(loader.len().await, 3);
        assert_eq!(loader.snapshot().await.last().unwrap().mac, moved);
    }
}
