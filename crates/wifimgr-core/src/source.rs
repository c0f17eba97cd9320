// ── Collaborator interfaces ──
//
// The engine never talks HTTP and never owns the cache. It consumes these
// traits: a queryable multi-vendor cache, one vendor client per API label,
// a WLAN template store, and the configuration loader. Cache reads are
// synchronous (local data); anything that may cross the network is async.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ApiError, CoreError};
use crate::managed_keys::ManagedKeySpec;
use crate::model::{
    CachedDevice, ConfigDoc, DeviceType, InventoryEntry, LoadedSite, MacAddress, NamedObject,
    SiteRef, Vendor, WlanRecord, WlanTemplate,
};

/// Read access to the multi-vendor cache.
#[async_trait]
pub trait DeviceCache: Send + Sync {
    fn site_by_name(&self, api_label: &str, name: &str) -> Option<SiteRef>;

    fn site_by_id(&self, api_label: &str, site_id: &str) -> Option<SiteRef>;

    /// Org-level inventory for one device type, including unassigned devices.
    fn inventory(&self, api_label: &str, device_type: DeviceType) -> Vec<InventoryEntry>;

    /// Devices of one type currently assigned to a site.
    fn site_devices(
        &self,
        api_label: &str,
        site_id: &str,
        device_type: DeviceType,
    ) -> Vec<CachedDevice>;

    fn device_by_mac(&self, api_label: &str, mac: &MacAddress) -> Option<CachedDevice>;

    /// Named objects of one kind (e.g. `deviceprofile`) for alias translation.
    fn named_objects(&self, api_label: &str, kind: &str) -> Vec<NamedObject>;

    /// Re-fetch the cache contents for one API label from the vendor.
    async fn refresh(&self, api_label: &str) -> Result<(), ApiError>;
}

/// Mutating and live-read operations of one vendor API.
#[async_trait]
pub trait VendorClient: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn supports_wlans(&self) -> bool;

    async fn site_id_by_name(&self, name: &str) -> Result<Option<String>, ApiError>;

    async fn assign_devices(&self, site_id: &str, macs: &[MacAddress]) -> Result<(), ApiError>;

    async fn unassign_devices(&self, macs: &[MacAddress]) -> Result<(), ApiError>;

    async fn update_device(
        &self,
        site_id: &str,
        device_id: &str,
        device_type: DeviceType,
        payload: &ConfigDoc,
    ) -> Result<(), ApiError>;

    async fn list_wlans(&self, site_id: &str) -> Result<Vec<WlanRecord>, ApiError>;

    async fn create_wlan(&self, site_id: &str, wlan: &ConfigDoc) -> Result<WlanRecord, ApiError>;

    async fn update_wlan(
        &self,
        site_id: &str,
        wlan_id: &str,
        wlan: &ConfigDoc,
    ) -> Result<(), ApiError>;
}

/// API label → client lookup.
pub trait ApiRegistry: Send + Sync {
    fn client(&self, api_label: &str) -> Option<Arc<dyn VendorClient>>;

    /// Label used when a site does not name its API.
    fn default_label(&self) -> Option<String>;
}

/// Named WLAN templates.
pub trait TemplateStore: Send + Sync {
    fn wlan_template(&self, label: &str) -> Option<WlanTemplate>;
}

/// Source of site configurations and per-API settings.
pub trait ConfigSource: Send + Sync {
    /// Parse the site from disk. Called once per invocation; never cached.
    fn load_site(&self, site_name: &str) -> Result<LoadedSite, CoreError>;

    /// Managed keys for an API + device type. `None` means undeclared.
    fn managed_keys(&self, api_label: &str, device_type: DeviceType) -> Option<ManagedKeySpec>;

    /// Path of the operator-curated inventory allowlist.
    fn inventory_file(&self) -> PathBuf;

    /// Load the WLAN template store.
    fn load_templates(&self) -> Result<Arc<dyn TemplateStore>, CoreError>;
}
