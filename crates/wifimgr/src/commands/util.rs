//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use wifimgr_core::memory::{MemoryCache, MemoryVendor, StaticRegistry};

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read an exported cache snapshot.
pub fn load_snapshot(path: &Path) -> Result<MemoryCache, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CliError::NotFound {
        resource_type: "cache snapshot".into(),
        identifier: path.display().to_string(),
        hint: format!("Pass an exported cache with --cache ({e})."),
    })?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "cache".into(),
        reason: format!("invalid cache snapshot {}: {e}", path.display()),
    })
}

/// One read-only vendor client per API label in the snapshot, seeded with
/// its sites and WLANs. Labels are registered in sorted order, so the
/// alphabetically first label is the default.
pub fn snapshot_registry(cache: &MemoryCache) -> Result<StaticRegistry, CliError> {
    let mut labels: Vec<&String> = cache.apis.keys().collect();
    labels.sort();

    let mut registry = StaticRegistry::new();
    for label in labels {
        let snapshot = &cache.apis[label];
        let vendor = snapshot.vendor.ok_or_else(|| CliError::Validation {
            field: format!("cache.apis.{label}.vendor"),
            reason: "the snapshot does not name the vendor of this API".into(),
        })?;
        let mut client = MemoryVendor::new(vendor).read_only();
        for site in &snapshot.sites {
            client = client.with_site(site.clone());
        }
        for (site_id, wlans) in &snapshot.wlans {
            client = client.with_wlans(site_id.clone(), wlans.clone());
        }
        debug!(api = %label, %vendor, sites = snapshot.sites.len(), "snapshot client registered");
        registry = registry.with_client(label.clone(), Arc::new(client));
    }
    Ok(registry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wifimgr_core::ApiRegistry;

    #[test]
    fn registry_defaults_to_first_label() {
        let cache: MemoryCache = serde_json::from_value(json!({ "apis": {
            "z-meraki": { "vendor": "meraki" },
            "a-mist": { "vendor": "mist", "sites": [{ "id": "s1", "name": "lab" }] }
        } }))
        .unwrap();
        let registry = snapshot_registry(&cache).unwrap();
        assert_eq!(registry.default_label().as_deref(), Some("a-mist"));
        assert!(registry.client("z-meraki").is_some());
    }

    #[test]
    fn vendor_is_required() {
        let cache: MemoryCache = serde_json::from_value(json!({ "apis": { "x": {} } })).unwrap();
        assert!(matches!(snapshot_registry(&cache), Err(CliError::Validation { .. })));
    }
}
