// ── Device domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::ConfigDoc;
use super::mac::MacAddress;

/// Device families the engine reconciles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceType {
    Ap,
    Switch,
    Gateway,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Ap, DeviceType::Switch, DeviceType::Gateway];
}

/// Which device types an apply invocation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTarget {
    One(DeviceType),
    All,
}

impl DeviceTarget {
    pub fn types(self) -> Vec<DeviceType> {
        match self {
            Self::One(t) => vec![t],
            Self::All => DeviceType::ALL.to_vec(),
        }
    }
}

impl std::str::FromStr for DeviceTarget {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse::<DeviceType>().map(Self::One)
        }
    }
}

/// Controller vendor behind an API label.
///
/// The two vendors differ in how a WLAN is scoped to a subset of APs:
/// Mist lists AP IDs on the WLAN, Meraki matches AP tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Vendor {
    Mist,
    Meraki,
}

/// A site as known to the cache or a vendor API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    pub id: String,
    pub name: String,
}

/// Current site assignment of an inventory device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAssignment {
    pub site_id: String,
    pub site_name: String,
}

/// One row of a vendor's org-level inventory, as held in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

/// A device assigned to a site, with its live configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDevice {
    pub id: String,
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    pub site_id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub config: ConfigDoc,
}

/// A named object (device profile, RF template, ...) used to resolve
/// `*_name` alias fields into IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedObject {
    pub id: String,
    pub name: String,
}

/// Cached snapshot of one device, loaded once per apply run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub mac: MacAddress,
    pub id: String,
    pub name: Option<String>,
    pub config: ConfigDoc,
}

impl DeviceState {
    /// Build from a cache record. Returns `None` when the cached MAC is unparseable.
    pub fn from_cached(device: &CachedDevice) -> Option<Self> {
        let mac = MacAddress::parse(&device.mac)?;
        Some(Self {
            mac,
            id: device.id.clone(),
            name: device.name.clone(),
            config: device.config.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn device_type_parses_case_insensitively() {
        assert_eq!("AP".parse::<DeviceType>().unwrap(), DeviceType::Ap);
        assert_eq!("switch".parse::<DeviceType>().unwrap(), DeviceType::Switch);
        assert_eq!(DeviceType::Gateway.to_string(), "gateway");
    }

    #[test]
    fn target_all_expands_in_processing_order() {
        let target: DeviceTarget = "all".parse().unwrap();
        assert_eq!(
            target.types(),
            vec![DeviceType::Ap, DeviceType::Switch, DeviceType::Gateway]
        );
        assert!("router".parse::<DeviceTarget>().is_err());
    }

    #[test]
    fn device_state_rejects_bad_cached_mac() {
        let cached = CachedDevice {
            id: "d1".into(),
            mac: "bogus".into(),
            name: None,
            site_id: "s1".into(),
            device_type: DeviceType::Ap,
            config: ConfigDoc::new(),
        };
        assert!(DeviceState::from_cached(&cached).is_none());
    }
}
