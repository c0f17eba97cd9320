// ── Apply report ──

use std::path::PathBuf;

use serde::Serialize;

use crate::error::DeviceFailure;
use crate::model::{DeviceType, MacAddress, Vendor};
use crate::wlan::{WlanAction, WlanPlan};

/// Per-device-type outcome. In diff mode the lists are what would happen.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTypeReport {
    pub device_type: DeviceType,
    /// Mutations were suppressed for this type.
    pub preview: bool,
    pub configured: usize,
    pub ineligible: usize,
    pub assign: Vec<MacAddress>,
    pub unassign: Vec<MacAddress>,
    pub update: Vec<MacAddress>,
    pub unchanged: Vec<MacAddress>,
    pub failed: Vec<DeviceFailure>,
    /// Eligible devices with no cached state at the site yet, so their
    /// settings could not be compared this run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<MacAddress>,
    pub update_detection_skipped: bool,
    /// Processing of this type stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl DeviceTypeReport {
    pub fn new(device_type: DeviceType, preview: bool) -> Self {
        Self {
            device_type,
            preview,
            configured: 0,
            ineligible: 0,
            assign: Vec::new(),
            unassign: Vec::new(),
            update: Vec::new(),
            unchanged: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
            update_detection_skipped: false,
            aborted: None,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.assign.is_empty() || !self.unassign.is_empty() || !self.update.is_empty()
    }

    fn sort(&mut self) {
        self.assign.sort();
        self.unassign.sort();
        self.update.sort();
        self.unchanged.sort();
        self.pending.sort();
        self.failed.sort_by(|a, b| a.mac.cmp(&b.mac));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WlanReportEntry {
    pub ssid: String,
    pub label: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseError {
    pub phase: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub site: String,
    pub site_id: String,
    pub api_label: String,
    pub vendor: Vendor,
    pub diff: bool,
    pub device_types: Vec<DeviceTypeReport>,
    pub wlans: Vec<WlanReportEntry>,
    pub warnings: Vec<String>,
    pub phase_errors: Vec<PhaseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

impl ApplyReport {
    pub fn new(site: &str, api_label: &str, vendor: Vendor, diff: bool) -> Self {
        Self {
            site: site.to_owned(),
            site_id: String::new(),
            api_label: api_label.to_owned(),
            vendor,
            diff,
            device_types: Vec::new(),
            wlans: Vec::new(),
            warnings: Vec::new(),
            phase_errors: Vec::new(),
            backup: None,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn phase_error(&mut self, phase: &str, message: impl Into<String>) {
        self.phase_errors.push(PhaseError {
            phase: phase.to_owned(),
            message: message.into(),
        });
    }

    /// Record a WLAN plan. Unchanged entries are kept so the report shows
    /// everything that was checked.
    pub fn record_wlans(&mut self, plan: &WlanPlan) {
        for change in &plan.changes {
            let action = match change.action {
                WlanAction::Create => "create",
                WlanAction::Update { .. } => "update",
                WlanAction::Unchanged { .. } => "unchanged",
            };
            self.wlans.push(WlanReportEntry {
                ssid: change.ssid.clone(),
                label: change.label.clone(),
                action: action.to_owned(),
            });
        }
    }

    /// Something was (or in diff mode, would be) changed.
    pub fn changed(&self) -> bool {
        self.device_types.iter().any(DeviceTypeReport::has_changes)
            || self.wlans.iter().any(|w| w.action != "unchanged")
    }

    pub fn failures(&self) -> Vec<DeviceFailure> {
        self.device_types
            .iter()
            .flat_map(|t| t.failed.iter().cloned())
            .collect()
    }

    /// Sort every list so output is independent of map iteration order.
    pub fn finish(&mut self) {
        for report in &mut self.device_types {
            report.sort();
        }
        self.device_types.sort_by_key(|r| r.device_type);
        self.wlans.sort_by(|a, b| a.ssid.cmp(&b.ssid));
        self.warnings.sort();
        self.warnings.dedup();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    #[test]
    fn finish_sorts_everything() {
        let mut report = ApplyReport::new("lab", "mist", Vendor::Mist, true);
        let mut switches = DeviceTypeReport::new(DeviceType::Switch, false);
        switches.update = vec![mac("aa:bb:cc:dd:ee:09"), mac("aa:bb:cc:dd:ee:01")];
        report.device_types.push(switches);
        report.device_types.push(DeviceTypeReport::new(DeviceType::Ap, false));
        report.warn("b");
        report.warn("a");
        report.warn("b");
        report.finish();

        assert_eq!(report.device_types[0].device_type, DeviceType::Ap);
        assert_eq!(report.device_types[1].update[0], mac("aa:bb:cc:dd:ee:01"));
        assert_eq!(report.warnings, vec!["a", "b"]);
        assert!(report.changed());
    }

    #[test]
    fn empty_report_is_not_a_change() {
        let report = ApplyReport::new("lab", "mist", Vendor::Mist, false);
        assert!(!report.changed());
        assert!(report.failures().is_empty());
    }
}
