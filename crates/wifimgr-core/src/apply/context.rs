// ── Per-invocation apply state ──
//
// Everything one apply run needs travels in `ApplyContext`, built once at
// the start of the run and threaded through every phase. Nothing is kept
// between invocations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::managed_keys::ManagedKeySpec;
use crate::model::{DeviceTarget, DeviceType, LoadedSite, Vendor};
use crate::source::{TemplateStore, VendorClient};
use crate::updater::AliasResolver;
use crate::wlan::ApTagMapping;

/// Mode flags of one apply invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Preview only. Nothing is mutated, whatever the other flags say.
    pub diff: bool,
    /// Bypass the unchanged-file skip and inventory exclusion. The
    /// dual-inventory write gate still applies.
    pub force: bool,
    /// Refresh the cache from the vendor before computing anything.
    pub refresh_cache: bool,
}

/// What to apply.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub site_name: String,
    pub target: DeviceTarget,
    pub options: ApplyOptions,
}

impl ApplyRequest {
    pub fn new(site_name: impl Into<String>, target: DeviceTarget) -> Self {
        Self {
            site_name: site_name.into(),
            target,
            options: ApplyOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }
}

pub struct ApplyContext {
    pub site: LoadedSite,
    pub api_label: String,
    pub vendor: Vendor,
    pub client: Arc<dyn VendorClient>,
    pub options: ApplyOptions,
    pub device_types: Vec<DeviceType>,
    /// `None` when templates failed to load.
    pub templates: Option<Arc<dyn TemplateStore>>,
    /// Declared managed keys per type. Types missing here run as preview.
    pub managed_keys: BTreeMap<DeviceType, ManagedKeySpec>,
    pub aliases: AliasResolver,
    /// Filled by the WLAN phase for tag-model vendors.
    pub tag_mapping: Option<ApTagMapping>,
    pub site_id: String,
    /// Skip update detection: the site file has not changed since the last
    /// clean run.
    pub skip_update_detection: bool,
    pub cancel: CancellationToken,
}

impl ApplyContext {
    pub fn site_name(&self) -> &str {
        &self.site.name
    }

    /// Whether mutations for this type are allowed in this run.
    pub fn is_writable(&self, device_type: DeviceType) -> bool {
        !self.options.diff && self.managed_keys.contains_key(&device_type)
    }

    /// Types forced into preview because their managed keys are undeclared.
    pub fn preview_only_types(&self) -> BTreeSet<DeviceType> {
        self.device_types
            .iter()
            .copied()
            .filter(|t| !self.managed_keys.contains_key(t))
            .collect()
    }

    /// Stop at a phase boundary when cancellation was requested.
    pub fn checkpoint(&self, next_phase: &str) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled {
                phase: next_phase.to_owned(),
            });
        }
        Ok(())
    }
}
