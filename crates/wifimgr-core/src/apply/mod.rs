// ── Apply orchestrator ──
//
// Runs one apply invocation as a fixed sequence of phases:
//
//   1. load templates          6. compute device sets
//   2. managed-keys check      7. unassign + assign
//   3. config change check     8. WLAN reconciliation
//   4. resolve site ID         9. device updates
//   5. optional cache refresh 10. finalize (backup, hash cache)
//
// Configuration problems surface before the first mutation. Cancellation
// is honoured between phases only.

pub mod context;
pub mod report;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backup::{BackupManager, DeviceSnapshot, FileHashCache};
use crate::batch_loader::DeviceBatchLoader;
use crate::error::{ApiError, CoreError};
use crate::inventory::InventoryChecker;
use crate::model::{DeviceState, DeviceType, MacAddress, Vendor};
use crate::source::{ApiRegistry, ConfigSource, DeviceCache};
use crate::updater::{AliasResolver, DeviceUpdater, rollback_command};
use crate::wlan;

pub use context::{ApplyContext, ApplyOptions, ApplyRequest};
pub use report::{ApplyReport, DeviceTypeReport, PhaseError, WlanReportEntry};

/// State carried from the device-set phase to the mutation phases.
struct TypeWork {
    inventory: InventoryChecker,
    loader: DeviceBatchLoader,
    eligible: Vec<MacAddress>,
    report: DeviceTypeReport,
}

impl TypeWork {
    fn updater<'a>(&'a self, ctx: &'a ApplyContext) -> DeviceUpdater<'a> {
        let device_type = self.report.device_type;
        let spec = ctx.managed_keys.get(&device_type).cloned().unwrap_or_default();
        let updater =
            DeviceUpdater::new(&ctx.site.config, &self.inventory, &self.loader, &ctx.aliases)
                .with_managed_keys(spec);
        match &ctx.tag_mapping {
            Some(mapping) => updater.with_ap_tags(mapping),
            None => updater,
        }
    }
}

pub struct ApplyOrchestrator {
    config: Arc<dyn ConfigSource>,
    cache: Arc<dyn DeviceCache>,
    apis: Arc<dyn ApiRegistry>,
    backups: BackupManager,
    hash_cache_file: PathBuf,
}

impl ApplyOrchestrator {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        cache: Arc<dyn DeviceCache>,
        apis: Arc<dyn ApiRegistry>,
        backups: BackupManager,
        hash_cache_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            cache,
            apis,
            backups,
            hash_cache_file: hash_cache_file.into(),
        }
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Run one apply invocation.
    ///
    /// Device update failures do not stop the batch; they are returned
    /// together as `CoreError::PartialUpdate` once every phase has run.
    pub async fn apply(
        &self,
        request: &ApplyRequest,
        cancel: CancellationToken,
    ) -> Result<ApplyReport, CoreError> {
        let (mut ctx, mut report) = self.prepare(request, cancel).await?;

        ctx.checkpoint("device sets")?;
        let mut work = self.compute_device_sets(&ctx, &mut report).await?;

        ctx.checkpoint("assign")?;
        assign_phase(&ctx, &work).await?;
        adopt_assigned(self.cache.as_ref(), &ctx, &work).await;

        ctx.checkpoint("wlans")?;
        let ap_loader = work
            .iter()
            .find(|w| w.report.device_type == DeviceType::Ap)
            .map(|w| &w.loader);
        let ap_ids = match ap_loader {
            Some(loader) => loader
                .snapshot()
                .await
                .into_iter()
                .map(|s| (s.mac, s.id))
                .collect(),
            None => HashMap::new(),
        };
        wlan_phase(&mut ctx, &mut report, &ap_ids).await?;

        ctx.checkpoint("device updates")?;
        self.update_phase(&ctx, &mut work, &mut report).await?;

        ctx.checkpoint("finalize")?;
        report
            .device_types
            .extend(work.into_iter().map(|w| w.report));
        self.finalize(&ctx, report)
    }

    // ── Phases 1-5 ──

    async fn prepare(
        &self,
        request: &ApplyRequest,
        cancel: CancellationToken,
    ) -> Result<(ApplyContext, ApplyReport), CoreError> {
        let options = request.options;
        let site = self.config.load_site(&request.site_name)?;

        let api_label = site
            .config
            .api
            .clone()
            .or_else(|| self.apis.default_label())
            .ok_or_else(|| CoreError::Config {
                message: format!(
                    "site '{}' does not name an API and no default is configured",
                    site.name
                ),
            })?;
        let client = self.apis.client(&api_label).ok_or_else(|| CoreError::Config {
            message: format!("API '{api_label}' is not configured"),
        })?;
        let vendor = client.vendor();
        let device_types = request.target.types();
        let mut report = ApplyReport::new(&site.name, &api_label, vendor, options.diff);
        info!(site = %site.name, api = %api_label, %vendor, diff = options.diff, "apply started");

        // 1. templates
        let templates = match self.config.load_templates() {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "WLAN templates not loaded; WLAN phase skipped");
                report.warn(format!("WLAN templates not loaded: {e}"));
                None
            }
        };
        if device_types.contains(&DeviceType::Ap) {
            if let Some(store) = &templates {
                wlan::validate_references(&site.config, store.as_ref(), vendor)?;
            }
        }

        // 2. managed keys
        let mut managed_keys = BTreeMap::new();
        for device_type in &device_types {
            match self.config.managed_keys(&api_label, *device_type) {
                Some(spec) => {
                    managed_keys.insert(*device_type, spec.with_alias_ids());
                }
                None if options.diff => {}
                None => {
                    warn!(
                        api = %api_label,
                        device_type = %device_type,
                        "managed keys not declared; running in diff mode"
                    );
                    report.warn(format!(
                        "no managed keys declared for {api_label}/{device_type}; \
                         {device_type} changes are preview only"
                    ));
                }
            }
        }

        // 3. config change
        let unchanged = FileHashCache::load(&self.hash_cache_file)
            .is_unchanged(&site.path)
            .unwrap_or_else(|e| {
                warn!(error = %e, "config change check failed");
                false
            });
        let skip_update_detection = unchanged && !options.force && !options.diff;
        if skip_update_detection {
            info!(path = %site.path.display(), "site configuration unchanged since last apply");
            report.warn(
                "site configuration unchanged since last apply; device update detection skipped \
                 (use --force to override)",
            );
        }

        // 4. site ID
        let site_id = match self.cache.site_by_name(&api_label, &site.name) {
            Some(found) => found.id,
            None => client
                .site_id_by_name(&site.name)
                .await?
                .ok_or_else(|| CoreError::SiteNotFound {
                    name: site.name.clone(),
                })?,
        };
        report.site_id.clone_from(&site_id);
        debug!(site = %site.name, site_id = %site_id, "site resolved");

        // 5. cache refresh
        if options.refresh_cache {
            info!(api = %api_label, "refreshing cache");
            self.cache.refresh(&api_label).await?;
        }

        let aliases = AliasResolver::build(self.cache.as_ref(), &api_label, &site.config);
        let ctx = ApplyContext {
            site,
            api_label,
            vendor,
            client,
            options,
            device_types,
            templates,
            managed_keys,
            aliases,
            tag_mapping: None,
            site_id,
            skip_update_detection,
            cancel,
        };
        Ok((ctx, report))
    }

    // ── Phase 6 ──

    async fn compute_device_sets(
        &self,
        ctx: &ApplyContext,
        report: &mut ApplyReport,
    ) -> Result<Vec<TypeWork>, CoreError> {
        let allowlist = self.config.inventory_file();
        let mut work = Vec::new();

        for &device_type in &ctx.device_types {
            let cache = self.cache.as_ref();
            let inventory = InventoryChecker::load(cache, &ctx.api_label, device_type, &allowlist)?;
            let loader = DeviceBatchLoader::load(cache, &ctx.api_label, &ctx.site_id, device_type);
            let mut item = TypeWork {
                inventory,
                loader,
                eligible: Vec::new(),
                report: DeviceTypeReport::new(device_type, !ctx.is_writable(device_type)),
            };
            let updater = item.updater(ctx);

            let configured = updater.configured_devices();
            let status = updater.find_devices_inventory_status(&configured);
            for line in status.warnings() {
                report.warn(format!("{device_type} {line}"));
            }
            let ineligible = status.ineligible_count();
            let eligible = if ctx.options.force {
                configured.clone()
            } else {
                status.eligible
            };

            let mut type_report = DeviceTypeReport::new(device_type, item.report.preview);
            type_report.configured = configured.len();
            type_report.ineligible = ineligible;

            if !configured.is_empty() && eligible.is_empty() {
                const REASON: &str = "no configured device is present in both inventories";
                warn!(device_type = %device_type, "{REASON}");
                type_report.aborted = Some(REASON.into());
            } else {
                if ineligible > 0 && !ctx.options.force {
                    report.warn(format!(
                        "{ineligible} {device_type} device(s) excluded: \
                         not present in both inventories"
                    ));
                }
                type_report.unassign = updater.find_devices_to_unassign().await;
                type_report.assign = updater.find_devices_to_assign(&eligible);
                for mac in &type_report.assign {
                    if let Some(current) = item.inventory.site_assignment(mac) {
                        let from = self
                            .cache
                            .site_by_id(&ctx.api_label, &current.site_id)
                            .map_or(current.site_id, |site| site.name);
                        report.warn(format!("{device_type} {mac}: moving from site '{from}'"));
                    }
                }
            }
            drop(updater);

            item.eligible = eligible;
            item.report = type_report;
            work.push(item);
        }
        Ok(work)
    }

    // ── Phase 9 ──

    async fn update_phase(
        &self,
        ctx: &ApplyContext,
        work: &mut [TypeWork],
        report: &mut ApplyReport,
    ) -> Result<(), CoreError> {
        for item in work.iter_mut() {
            if item.report.aborted.is_some() {
                continue;
            }
            for mac in &item.eligible {
                if item.loader.device_by_mac(mac).await.is_err() {
                    item.report.pending.push(mac.clone());
                }
            }
            if !item.report.pending.is_empty() {
                report.warn(format!(
                    "{} {} device(s) have no cached state at the site yet; \
                     settings not compared until the cache is refreshed",
                    item.report.pending.len(),
                    item.report.device_type
                ));
            }
            if ctx.skip_update_detection {
                item.report.update_detection_skipped = true;
                continue;
            }
            let device_type = item.report.device_type;
            let updater = item.updater(ctx);
            let targets = updater.find_devices_to_update(&item.eligible).await;
            debug!(device_type = %device_type, count = targets.len(), "devices to update");

            if item.report.preview || targets.is_empty() {
                drop(updater);
                item.report.update = targets;
                continue;
            }

            let snapshot = DeviceSnapshot::new(
                ctx.site_name(),
                &ctx.site_id,
                &ctx.api_label,
                device_type,
                "update",
                item.loader.states_for(&targets).await,
            );
            if let Err(e) = self.backups.write_device_snapshot(&snapshot) {
                warn!(error = %e, device_type = %device_type, "device state snapshot not written");
                report.warn(format!("{device_type} device state snapshot not written: {e}"));
            }

            let batch = updater
                .update_device_configurations(ctx.client.as_ref(), &targets)
                .await?;
            drop(updater);
            item.report.update = batch.succeeded;
            item.report.unchanged = batch.unchanged;
            item.report.failed = batch.failed;
        }
        Ok(())
    }

    // ── Phase 10 ──

    fn finalize(
        &self,
        ctx: &ApplyContext,
        mut report: ApplyReport,
    ) -> Result<ApplyReport, CoreError> {
        report.finish();
        if ctx.options.diff {
            let changes = report.changed();
            info!(site = %ctx.site_name(), changes, "diff complete; nothing applied");
            return Ok(report);
        }

        if report.changed() {
            match self.backups.write_backup(&ctx.site.path) {
                Ok(path) => report.backup = Some(path),
                Err(e) => {
                    warn!(error = %e, "configuration backup not written");
                    report.warn(format!("configuration backup not written: {e}"));
                }
            }
        }

        let failures = report.failures();
        let clean = failures.is_empty()
            && report.phase_errors.is_empty()
            && ctx.preview_only_types().is_empty()
            && report
                .device_types
                .iter()
                .all(|t| t.aborted.is_none() && t.pending.is_empty());
        if clean {
            let mut hashes = FileHashCache::load(&self.hash_cache_file);
            if let Err(e) = hashes
                .record(&ctx.site.path)
                .and_then(|()| hashes.save(&self.hash_cache_file))
            {
                warn!(error = %e, "hash cache not updated");
                report.warn(format!("hash cache not updated: {e}"));
            }
        }

        if !failures.is_empty() {
            let attempted = report
                .device_types
                .iter()
                .map(|t| t.update.len() + t.unchanged.len() + t.failed.len())
                .sum();
            return Err(CoreError::PartialUpdate {
                attempted,
                failures,
                rollback_command: rollback_command(ctx.site_name()),
            });
        }

        info!(site = %ctx.site_name(), changed = report.changed(), "apply complete");
        Ok(report)
    }
}

// ── Phase 7 ──

async fn assign_phase(ctx: &ApplyContext, work: &[TypeWork]) -> Result<(), CoreError> {
    for item in work {
        if item.report.preview || item.report.aborted.is_some() {
            continue;
        }
        let updater = item.updater(ctx);
        updater
            .unassign_devices(ctx.client.as_ref(), &item.report.unassign)
            .await?;
        updater
            .assign_devices(ctx.client.as_ref(), &item.report.assign)
            .await?;
    }
    Ok(())
}

/// Pull cached state for devices assigned this run (or, in diff mode,
/// that would be) into the site batch, so WLAN scoping and the update
/// phase see them.
async fn adopt_assigned(cache: &dyn DeviceCache, ctx: &ApplyContext, work: &[TypeWork]) {
    for item in work {
        if item.report.aborted.is_some() {
            continue;
        }
        let device_type = item.report.device_type;
        for mac in &item.report.assign {
            let state = cache
                .device_by_mac(&ctx.api_label, mac)
                .filter(|cached| cached.device_type == device_type)
                .and_then(|cached| DeviceState::from_cached(&cached));
            match state {
                Some(state) => item.loader.insert(state).await,
                None => debug!(mac = %mac, %device_type, "assigned device not in cache"),
            }
        }
    }
}

// ── Phase 8 ──

async fn wlan_phase(
    ctx: &mut ApplyContext,
    report: &mut ApplyReport,
    ap_ids: &HashMap<MacAddress, String>,
) -> Result<(), CoreError> {
    if !ctx.device_types.contains(&DeviceType::Ap) {
        return Ok(());
    }
    let Some(templates) = ctx.templates.clone() else {
        return Ok(());
    };
    if let Err(e) = wlan::ensure_wlan_capable(ctx.client.as_ref(), &ctx.api_label) {
        report.phase_error("wlans", e.to_string());
        return Ok(());
    }

    let desired = wlan::desired_wlans(&ctx.site.config, templates.as_ref(), ctx.vendor, ap_ids);
    report.warnings.extend(desired.warnings);

    let existing = match ctx.client.list_wlans(&ctx.site_id).await {
        Ok(existing) => existing,
        Err(ApiError::Unsupported(what)) => {
            let e = CoreError::from(ApiError::Unsupported(what));
            warn!(error = %e, "WLAN phase skipped");
            report.phase_error("wlans", e.to_string());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let plan = wlan::plan(&desired.wlans, &existing, ctx.vendor, ctx.options.force);
    report.record_wlans(&plan);
    if !ctx.options.diff && !plan.is_noop() {
        wlan::apply_plan(ctx.client.as_ref(), &ctx.site_id, &plan).await?;
    }
    if ctx.vendor == Vendor::Meraki {
        ctx.tag_mapping = Some(desired.tag_mapping);
    }
    Ok(())
}
