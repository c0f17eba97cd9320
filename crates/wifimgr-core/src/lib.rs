//! Apply and reconciliation engine for wifimgr site configurations.
//!
//! Turns a declarative site file into the minimal, safe set of vendor
//! mutations (assign, unassign, device update, WLAN create/update):
//!
//! - **[`managed_keys`]**: Partial field ownership. A [`ManagedKeySpec`]
//!   scopes which dot-paths are compared and written; everything else is
//!   never reported as drift and never sent.
//!
//! - **[`InventoryChecker`]**: Dual-inventory gate. A device is writable
//!   only when it is in the vendor inventory *and* the local allowlist.
//!
//! - **[`DeviceBatchLoader`]**: One cache pass per site and device type,
//!   shared by the diff and update phases.
//!
//! - **[`DeviceUpdater`]**: Device sets, payload planning and best-effort
//!   batch updates returning a [`BatchResult`].
//!
//! - **[`wlan`]**: WLAN template expansion, vendor-specific AP scoping
//!   (ID lists or availability tags) and SSID-keyed create/update planning.
//!
//! - **[`ApplyOrchestrator`]**: The phased apply run, driven by an explicit
//!   per-invocation [`ApplyContext`].
//!
//! - **[`BackupManager`]**: Serial-indexed rotating backups, rollback and
//!   the config file hash cache.
//!
//! The engine reaches the outside world only through the collaborator
//! traits in [`source`]; [`memory`] provides snapshot-backed implementations.

pub mod apply;
pub mod backup;
pub mod batch_loader;
pub mod error;
pub mod inventory;
pub mod managed_keys;
pub mod memory;
pub mod model;
pub mod source;
pub mod updater;
pub mod wlan;

// ── Primary re-exports ──────────────────────────────────────────────
pub use apply::{ApplyContext, ApplyOptions, ApplyOrchestrator, ApplyReport, ApplyRequest};
pub use backup::{BackupManager, FileHashCache};
pub use batch_loader::DeviceBatchLoader;
pub use error::{ApiError, CoreError, DeviceFailure};
pub use inventory::{InventoryChecker, InventoryStatus};
pub use managed_keys::ManagedKeySpec;
pub use source::{ApiRegistry, ConfigSource, DeviceCache, TemplateStore, VendorClient};
pub use updater::{BatchResult, DeviceUpdater};

pub use model::{
    ConfigDoc, ConfigFile, DeviceState, DeviceTarget, DeviceType, LoadedSite, MacAddress,
    SiteConfiguration, Vendor, WlanRecord, WlanTemplate,
};
