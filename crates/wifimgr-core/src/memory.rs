// ── In-memory collaborators ──
//
// Snapshot-backed implementations of the collaborator traits. The CLI uses
// `MemoryCache` + a read-only `MemoryVendor` to preview an apply against an
// exported cache file; tests use them as recording fakes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::model::{
    CachedDevice, ConfigDoc, DeviceType, InventoryEntry, MacAddress, NamedObject, SiteRef, Vendor,
    WlanRecord, WlanTemplate,
};
use crate::source::{ApiRegistry, DeviceCache, TemplateStore, VendorClient};

// ── MemoryCache ─────────────────────────────────────────────────────

/// Cached data for one API label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Vendor>,
    #[serde(default)]
    pub sites: Vec<SiteRef>,
    #[serde(default)]
    pub inventory: HashMap<DeviceType, Vec<InventoryEntry>>,
    #[serde(default)]
    pub devices: Vec<CachedDevice>,
    #[serde(default)]
    pub named_objects: HashMap<String, Vec<NamedObject>>,
    /// Site ID → WLANs, used to seed a snapshot-backed vendor client.
    #[serde(default)]
    pub wlans: HashMap<String, Vec<WlanRecord>>,
}

/// A multi-vendor cache held entirely in memory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryCache {
    #[serde(default)]
    pub apis: HashMap<String, ApiSnapshot>,
    #[serde(skip)]
    refreshes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api(mut self, label: impl Into<String>, snapshot: ApiSnapshot) -> Self {
        self.apis.insert(label.into(), snapshot);
        self
    }

    /// Number of times `refresh` was requested.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceCache for MemoryCache {
    fn site_by_name(&self, api_label: &str, name: &str) -> Option<SiteRef> {
        self.apis
            .get(api_label)?
            .sites
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn site_by_id(&self, api_label: &str, site_id: &str) -> Option<SiteRef> {
        self.apis
            .get(api_label)?
            .sites
            .iter()
            .find(|s| s.id == site_id)
            .cloned()
    }

    fn inventory(&self, api_label: &str, device_type: DeviceType) -> Vec<InventoryEntry> {
        self.apis
            .get(api_label)
            .and_then(|api| api.inventory.get(&device_type))
            .cloned()
            .unwrap_or_default()
    }

    fn site_devices(
        &self,
        api_label: &str,
        site_id: &str,
        device_type: DeviceType,
    ) -> Vec<CachedDevice> {
        self.apis
            .get(api_label)
            .map(|api| {
                api.devices
                    .iter()
                    .filter(|d| d.site_id == site_id && d.device_type == device_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn device_by_mac(&self, api_label: &str, mac: &MacAddress) -> Option<CachedDevice> {
        self.apis
            .get(api_label)?
            .devices
            .iter()
            .find(|d| MacAddress::parse(&d.mac).as_ref() == Some(mac))
            .cloned()
    }

    fn named_objects(&self, api_label: &str, kind: &str) -> Vec<NamedObject> {
        self.apis
            .get(api_label)
            .and_then(|api| api.named_objects.get(kind))
            .cloned()
            .unwrap_or_default()
    }

    async fn refresh(&self, _api_label: &str) -> Result<(), ApiError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── MemoryVendor ────────────────────────────────────────────────────

/// A mutation observed by `MemoryVendor`.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorCall {
    Assign {
        site_id: String,
        macs: Vec<MacAddress>,
    },
    Unassign {
        macs: Vec<MacAddress>,
    },
    UpdateDevice {
        site_id: String,
        device_id: String,
        device_type: DeviceType,
        payload: ConfigDoc,
    },
    CreateWlan {
        site_id: String,
        wlan: ConfigDoc,
    },
    UpdateWlan {
        site_id: String,
        wlan_id: String,
        wlan: ConfigDoc,
    },
}

#[derive(Debug, Default)]
struct VendorState {
    wlans: HashMap<String, Vec<WlanRecord>>,
    calls: Vec<VendorCall>,
    next_wlan: usize,
}

/// Vendor client that keeps WLANs in memory and records every mutation.
#[derive(Debug)]
pub struct MemoryVendor {
    vendor: Vendor,
    wlans_supported: bool,
    read_only: bool,
    sites: Vec<SiteRef>,
    failing_devices: HashSet<String>,
    state: Mutex<VendorState>,
}

impl MemoryVendor {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            wlans_supported: true,
            read_only: false,
            sites: Vec::new(),
            failing_devices: HashSet::new(),
            state: Mutex::new(VendorState::default()),
        }
    }

    pub fn with_site(mut self, site: SiteRef) -> Self {
        self.sites.push(site);
        self
    }

    pub fn with_wlans(mut self, site_id: impl Into<String>, wlans: Vec<WlanRecord>) -> Self {
        self.state.get_mut().wlans.insert(site_id.into(), wlans);
        self
    }

    pub fn without_wlan_support(mut self) -> Self {
        self.wlans_supported = false;
        self
    }

    /// Reject every mutation with `ApiError::ReadOnly`.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Make `update_device` fail for this device ID.
    pub fn failing_device(mut self, device_id: impl Into<String>) -> Self {
        self.failing_devices.insert(device_id.into());
        self
    }

    pub async fn calls(&self) -> Vec<VendorCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn wlans(&self, site_id: &str) -> Vec<WlanRecord> {
        self.state
            .lock()
            .await
            .wlans
            .get(site_id)
            .cloned()
            .unwrap_or_default()
    }

    fn guard_write(&self, operation: &str) -> Result<(), ApiError> {
        if self.read_only {
            return Err(ApiError::ReadOnly(operation.to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl VendorClient for MemoryVendor {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn supports_wlans(&self) -> bool {
        self.wlans_supported
    }

    async fn site_id_by_name(&self, name: &str) -> Result<Option<String>, ApiError> {
        Ok(self
            .sites
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id.clone()))
    }

    async fn assign_devices(&self, site_id: &str, macs: &[MacAddress]) -> Result<(), ApiError> {
        self.guard_write("assign devices")?;
        self.state.lock().await.calls.push(VendorCall::Assign {
            site_id: site_id.to_owned(),
            macs: macs.to_vec(),
        });
        Ok(())
    }

    async fn unassign_devices(&self, macs: &[MacAddress]) -> Result<(), ApiError> {
        self.guard_write("unassign devices")?;
        self.state.lock().await.calls.push(VendorCall::Unassign {
            macs: macs.to_vec(),
        });
        Ok(())
    }

    async fn update_device(
        &self,
        site_id: &str,
        device_id: &str,
        device_type: DeviceType,
        payload: &ConfigDoc,
    ) -> Result<(), ApiError> {
        self.guard_write("update device")?;
        if self.failing_devices.contains(device_id) {
            return Err(ApiError::Rejected {
                status: 500,
                message: format!("device {device_id} rejected the update"),
            });
        }
        self.state.lock().await.calls.push(VendorCall::UpdateDevice {
            site_id: site_id.to_owned(),
            device_id: device_id.to_owned(),
            device_type,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn list_wlans(&self, site_id: &str) -> Result<Vec<WlanRecord>, ApiError> {
        if !self.wlans_supported {
            return Err(ApiError::Unsupported("wlans".into()));
        }
        Ok(self.wlans(site_id).await)
    }

    async fn create_wlan(&self, site_id: &str, wlan: &ConfigDoc) -> Result<WlanRecord, ApiError> {
        self.guard_write("create wlan")?;
        let mut state = self.state.lock().await;
        state.next_wlan += 1;
        let record = WlanRecord {
            id: format!("wlan-{}", state.next_wlan),
            config: wlan.clone(),
        };
        state
            .wlans
            .entry(site_id.to_owned())
            .or_default()
            .push(record.clone());
        state.calls.push(VendorCall::CreateWlan {
            site_id: site_id.to_owned(),
            wlan: wlan.clone(),
        });
        Ok(record)
    }

    async fn update_wlan(
        &self,
        site_id: &str,
        wlan_id: &str,
        wlan: &ConfigDoc,
    ) -> Result<(), ApiError> {
        self.guard_write("update wlan")?;
        let mut state = self.state.lock().await;
        let record = state
            .wlans
            .get_mut(site_id)
            .and_then(|list| list.iter_mut().find(|w| w.id == wlan_id))
            .ok_or_else(|| ApiError::NotFound {
                entity: "wlan".into(),
                identifier: wlan_id.to_owned(),
            })?;
        record.config = wlan.clone();
        state.calls.push(VendorCall::UpdateWlan {
            site_id: site_id.to_owned(),
            wlan_id: wlan_id.to_owned(),
            wlan: wlan.clone(),
        });
        Ok(())
    }
}

// ── Registry / templates ────────────────────────────────────────────

/// Fixed API label → client map.
#[derive(Default)]
pub struct StaticRegistry {
    clients: HashMap<String, Arc<dyn VendorClient>>,
    default_label: Option<String>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. The first registered label becomes the default.
    pub fn with_client(mut self, label: impl Into<String>, client: Arc<dyn VendorClient>) -> Self {
        let label = label.into();
        if self.default_label.is_none() {
            self.default_label = Some(label.clone());
        }
        self.clients.insert(label, client);
        self
    }
}

impl ApiRegistry for StaticRegistry {
    fn client(&self, api_label: &str) -> Option<Arc<dyn VendorClient>> {
        self.clients.get(api_label).cloned()
    }

    fn default_label(&self) -> Option<String> {
        self.default_label.clone()
    }
}

/// Templates held in a map.
#[derive(Debug, Default, Clone)]
pub struct MemoryTemplateStore {
    templates: HashMap<String, WlanTemplate>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: WlanTemplate) -> Self {
        self.templates.insert(template.label.clone(), template);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn wlan_template(&self, label: &str) -> Option<WlanTemplate> {
        self.templates.get(label).cloned()
    }
}
