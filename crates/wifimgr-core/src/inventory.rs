// ── Dual-inventory safety gate ──
//
// A device may only be touched when it is both in the vendor's org
// inventory (as cached) and in the operator's local allowlist file.
// Built once per device type per apply run; every lookup is O(1).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{DeviceType, InventoryEntry, MacAddress, SiteAssignment};
use crate::source::DeviceCache;

/// On-disk shape of the local allowlist.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LocalInventoryFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub inventory: HashMap<DeviceType, Vec<String>>,
}

/// Membership of configured devices in the two inventories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryStatus {
    /// In both inventories.
    pub eligible: Vec<MacAddress>,
    /// Missing from the vendor inventory.
    pub not_in_api: Vec<MacAddress>,
    /// Missing from the local allowlist file.
    pub not_in_local: Vec<MacAddress>,
}

impl InventoryStatus {
    pub fn ineligible_count(&self) -> usize {
        let mut macs: HashSet<&MacAddress> = self.not_in_api.iter().collect();
        macs.extend(self.not_in_local.iter());
        macs.len()
    }

    /// One human-readable line per problem, sorted by MAC.
    pub fn warnings(&self) -> Vec<String> {
        let mut lines: Vec<(MacAddress, String)> = self
            .not_in_api
            .iter()
            .map(|m| (m.clone(), format!("{m}: not in API inventory")))
            .chain(
                self.not_in_local
                    .iter()
                    .map(|m| (m.clone(), format!("{m}: not in local inventory file"))),
            )
            .collect();
        lines.sort();
        lines.into_iter().map(|(_, line)| line).collect()
    }
}

#[derive(Debug)]
pub struct InventoryChecker {
    device_type: DeviceType,
    api: HashMap<MacAddress, Option<SiteAssignment>>,
    local: HashSet<MacAddress>,
}

impl InventoryChecker {
    /// Load the API inventory from the cache and the allowlist from disk.
    ///
    /// A missing allowlist file yields an empty local inventory (nothing is
    /// writable); a malformed one is a configuration error.
    pub fn load(
        cache: &dyn DeviceCache,
        api_label: &str,
        device_type: DeviceType,
        allowlist: &Path,
    ) -> Result<Self, CoreError> {
        let local = read_allowlist(allowlist, device_type)?;
        let checker = Self::from_parts(device_type, cache.inventory(api_label, device_type), local);
        debug!(
            %device_type,
            api = checker.api.len(),
            local = checker.local.len(),
            "inventory loaded"
        );
        Ok(checker)
    }

    pub fn from_parts(
        device_type: DeviceType,
        api: impl IntoIterator<Item = InventoryEntry>,
        local: impl IntoIterator<Item = MacAddress>,
    ) -> Self {
        let api = api
            .into_iter()
            .filter_map(|entry| {
                let mac = MacAddress::parse(&entry.mac)?;
                let assignment = entry
                    .site_id
                    .filter(|id| !id.is_empty())
                    .map(|site_id| SiteAssignment {
                        site_id,
                        site_name: entry.site_name.unwrap_or_default(),
                    });
                Some((mac, assignment))
            })
            .collect();
        Self {
            device_type,
            api,
            local: local.into_iter().collect(),
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn is_in_api_inventory(&self, mac: impl AsRef<str>) -> bool {
        MacAddress::parse(mac).is_some_and(|m| self.api.contains_key(&m))
    }

    pub fn is_in_local_inventory(&self, mac: impl AsRef<str>) -> bool {
        MacAddress::parse(mac).is_some_and(|m| self.local.contains(&m))
    }

    /// The gate required before any mutating call.
    pub fn is_in_inventory(&self, mac: impl AsRef<str>) -> bool {
        MacAddress::parse(mac).is_some_and(|m| self.api.contains_key(&m) && self.local.contains(&m))
    }

    /// Keep only MACs present in both inventories, preserving order.
    pub fn filter_by_inventory(&self, macs: &[MacAddress]) -> Vec<MacAddress> {
        macs.iter()
            .filter(|m| self.is_in_inventory(m))
            .cloned()
            .collect()
    }

    /// Current site assignment from the cached inventory. `None` when the
    /// device is unknown, unassigned, or the MAC is unparseable.
    pub fn site_assignment(&self, mac: impl AsRef<str>) -> Option<SiteAssignment> {
        let mac = MacAddress::parse(mac)?;
        self.api.get(&mac)?.clone()
    }

    pub fn status_of(&self, macs: &[MacAddress]) -> InventoryStatus {
        let mut status = InventoryStatus::default();
        for mac in macs {
            let in_api = self.api.contains_key(mac);
            let in_local = self.local.contains(mac);
            if !in_api {
                status.not_in_api.push(mac.clone());
            }
            if !in_local {
                status.not_in_local.push(mac.clone());
            }
            if in_api && in_local {
                status.eligible.push(mac.clone());
            }
        }
        status
    }
}

fn read_allowlist(path: &Path, device_type: DeviceType) -> Result<Vec<MacAddress>, CoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "local inventory file not found; no device is writable");
            return Ok(Vec::new());
        }
        Err(e) => return Err(CoreError::io(path, e)),
    };
    let file: LocalInventoryFile =
        serde_json::from_str(&raw).map_err(|e| CoreError::InvalidConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let entries = file.inventory.get(&device_type).cloned().unwrap_or_default();
    Ok(entries
        .iter()
        .filter_map(|raw| {
            let parsed = MacAddress::parse(raw);
            if parsed.is_none() {
                let path = path.display();
                warn!(%path, entry = %raw, "skipping invalid MAC in local inventory");
            }
            parsed
        })
        .collect())
}
