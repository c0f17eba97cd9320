//! `wifimgr apply <site> <type> [diff] [split] [refresh-api]`.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use wifimgr_config::{FileConfigSource, Settings};
use wifimgr_core::apply::DeviceTypeReport;
use wifimgr_core::{
    ApplyOptions, ApplyOrchestrator, ApplyReport, ApplyRequest, BackupManager, DeviceTarget,
};

use crate::cli::{ApplyArgs, ApplyMode, ApplyRunArgs, GlobalOpts, OutputFormat};
use crate::commands::{backups, util};
use crate::error::CliError;
use crate::output;

// ── Table rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Configured")]
    configured: usize,
    #[tabled(rename = "Excluded")]
    ineligible: usize,
    #[tabled(rename = "Assign")]
    assign: usize,
    #[tabled(rename = "Unassign")]
    unassign: usize,
    #[tabled(rename = "Update")]
    update: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&DeviceTypeReport> for TypeRow {
    fn from(r: &DeviceTypeReport) -> Self {
        Self {
            device_type: r.device_type.to_string(),
            configured: r.configured,
            ineligible: r.ineligible,
            assign: r.assign.len(),
            unassign: r.unassign.len(),
            update: r.update.len(),
            failed: r.failed.len(),
            status: type_status(r),
        }
    }
}

fn type_status(r: &DeviceTypeReport) -> String {
    if let Some(reason) = &r.aborted {
        format!("aborted: {reason}")
    } else if r.update_detection_skipped {
        "update check skipped".into()
    } else if r.preview {
        "preview".into()
    } else {
        "ok".into()
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct WlanRow {
    #[tabled(rename = "SSID")]
    ssid: String,
    #[tabled(rename = "Template")]
    label: String,
    #[tabled(rename = "Action")]
    action: String,
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: ApplyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = wifimgr_config::load_settings(global.config.as_deref())?;
    match args.command {
        Some(cmd) => backups::handle(cmd, &settings, global),
        None => run(args.run, &settings, global).await,
    }
}

async fn run(args: ApplyRunArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let (Some(site), Some(target)) = (args.site, args.target) else {
        return Err(CliError::Validation {
            field: "arguments".into(),
            reason: "expected <site> <device_type|all>".into(),
        });
    };
    let target: DeviceTarget = target.parse().map_err(|_| CliError::Validation {
        field: "device type".into(),
        reason: format!("expected ap, switch, gateway or all, got '{target}'"),
    })?;
    let options = ApplyOptions {
        diff: args.modes.contains(&ApplyMode::Diff),
        force: args.force,
        refresh_cache: args.modes.contains(&ApplyMode::RefreshApi),
    };
    let split = args.modes.contains(&ApplyMode::Split);

    if !options.diff {
        return Err(CliError::Unsupported {
            operation: "apply".into(),
            required: "a live vendor client; preview against the cache snapshot with 'diff'".into(),
        });
    }

    let orchestrator = build_orchestrator(settings, global)?;
    let request = ApplyRequest::new(site, target).with_options(options);

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping at the next phase boundary");
            watcher.cancel();
        }
    });

    debug!(site = %request.site_name, ?target, ?options, "running apply");
    let report = orchestrator.apply(&request, cancel).await?;

    if !global.quiet {
        let color = output::should_color(global.color);
        for line in &report.warnings {
            eprintln!("{}", output::warning_line(line, color));
        }
        for e in &report.phase_errors {
            let line = format!("{} phase: {}", e.phase, e.message);
            eprintln!("{}", output::error_line(&line, color));
        }
    }
    let rendered = render_report(&report, split, global.output)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn build_orchestrator(
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<ApplyOrchestrator, CliError> {
    let cache_path: PathBuf = global
        .cache
        .clone()
        .or_else(|| settings.cache_file.clone())
        .ok_or_else(|| CliError::Validation {
            field: "cache".into(),
            reason: "no cache snapshot configured; pass --cache or set cache_file".into(),
        })?;
    let cache = util::load_snapshot(&cache_path)?;
    let registry = util::snapshot_registry(&cache)?;

    let backups = BackupManager::new(&settings.backup_dir)
        .with_retention(settings.backups.retention)
        .with_max_age_days(settings.backups.max_age_days);
    Ok(ApplyOrchestrator::new(
        Arc::new(FileConfigSource::new(settings.clone())),
        Arc::new(cache),
        Arc::new(registry),
        backups,
        settings.hash_cache_file.clone(),
    ))
}

// ── Report rendering ─────────────────────────────────────────────────

pub(crate) fn render_report(
    report: &ApplyReport,
    split: bool,
    format: OutputFormat,
) -> Result<String, CliError> {
    output::render_single(format, report, |r| report_detail(r, split))
}

fn report_detail(report: &ApplyReport, split: bool) -> String {
    let mut out = String::new();
    let mode = if report.diff { " (diff)" } else { "" };
    let _ = writeln!(
        out,
        "Site {} ({}) via {} [{}]{mode}",
        report.site, report.site_id, report.api_label, report.vendor
    );

    let rows: Vec<TypeRow> = report.device_types.iter().map(TypeRow::from).collect();
    let _ = writeln!(out, "{}", output::render_table(&rows));

    if split {
        for r in &report.device_types {
            let devices = device_rows(r);
            if devices.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n── {} ──", r.device_type);
            let _ = writeln!(out, "{}", output::render_table(&devices));
        }
    }

    if !report.wlans.is_empty() {
        let wlans: Vec<WlanRow> = report
            .wlans
            .iter()
            .map(|w| WlanRow {
                ssid: w.ssid.clone(),
                label: w.label.clone(),
                action: w.action.clone(),
            })
            .collect();
        let _ = writeln!(out, "\nWLANs");
        let _ = writeln!(out, "{}", output::render_table(&wlans));
    }

    if let Some(path) = &report.backup {
        let _ = writeln!(out, "Backup written to {}", path.display());
    }
    if !report.changed() {
        let _ = writeln!(out, "No changes.");
    }
    out.trim_end().to_owned()
}

fn device_rows(r: &DeviceTypeReport) -> Vec<DeviceRow> {
    let simple = |macs: &[wifimgr_core::MacAddress], action: &'static str| {
        macs.iter()
            .map(|mac| DeviceRow {
                mac: mac.to_string(),
                action,
                detail: String::new(),
            })
            .collect::<Vec<_>>()
    };
    let mut rows = simple(&r.assign, "assign");
    rows.extend(simple(&r.unassign, "unassign"));
    rows.extend(simple(&r.update, "update"));
    rows.extend(simple(&r.unchanged, "unchanged"));
    rows.extend(r.pending.iter().map(|mac| DeviceRow {
        mac: mac.to_string(),
        action: "pending",
        detail: "not yet in cache".into(),
    }));
    rows.extend(r.failed.iter().map(|f| DeviceRow {
        mac: f.mac.clone(),
        action: "failed",
        detail: f.reason.clone(),
    }));
    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wifimgr_core::{DeviceType, MacAddress, Vendor};

    fn report() -> ApplyReport {
        let mut report = ApplyReport::new("lab", "mist-prod", Vendor::Mist, true);
        report.site_id = "s1".into();
        let mut ap = DeviceTypeReport::new(DeviceType::Ap, true);
        ap.configured = 2;
        ap.update = vec![MacAddress::parse("aa:bb:cc:dd:ee:01").unwrap()];
        ap.pending = vec![MacAddress::parse("aa:bb:cc:dd:ee:02").unwrap()];
        report.device_types.push(ap);
        report
    }

    #[test]
    fn table_summarizes_types_and_split_lists_devices() {
        let summary = render_report(&report(), false, OutputFormat::Table).unwrap();
        assert!(summary.starts_with("Site lab (s1) via mist-prod [mist] (diff)"));
        assert!(summary.contains("preview"));
        assert!(!summary.contains("aa:bb:cc:dd:ee:01"));

        let split = render_report(&report(), true, OutputFormat::Table).unwrap();
        assert!(split.contains("── ap ──"));
        assert!(split.contains("aa:bb:cc:dd:ee:01"));
        assert!(split.contains("not yet in cache"));
    }

    #[test]
    fn json_report_carries_every_list() {
        let json = render_report(&report(), false, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["device_types"][0]["update"][0], "aa:bb:cc:dd:ee:01");
        assert_eq!(value["device_types"][0]["pending"][0], "aa:bb:cc:dd:ee:02");
        assert_eq!(value["diff"], true);
    }
}
