// ── Domain model ──
//
// Identity types, the site configuration document, cached device state,
// and WLAN templates. Device payloads are kept as ordered JSON documents
// because managed-key paths walk an arbitrary, user-authored schema.

pub mod device;
pub mod mac;
pub mod site;
pub mod wlan;

/// Generic ordered key/value document used for device and WLAN payloads.
pub type ConfigDoc = serde_json::Map<String, serde_json::Value>;

pub use device::{
    CachedDevice, DeviceState, DeviceTarget, DeviceType, InventoryEntry, NamedObject,
    SiteAssignment, SiteRef, Vendor,
};
pub use mac::MacAddress;
pub use site::{
    ConfigFile, DeviceSections, LoadedSite, Profiles, SiteConfiguration, WLAN_BINDING_KEY,
};
pub use wlan::{WlanRecord, WlanTemplate};
