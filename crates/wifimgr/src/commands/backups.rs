//! `wifimgr apply rollback | list-backups | cleanup-backups | validate-backup`.

use std::fmt::Write as _;

use tabled::Tabled;

use wifimgr_config::{FileConfigSource, Settings};
use wifimgr_core::BackupManager;
use wifimgr_core::backup::{BackupEntry, BackupSummary, validate_backup};

use crate::cli::{ApplyCommand, GlobalOpts, OutputFormat};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Serial")]
    serial: usize,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Size")]
    size: u64,
    #[tabled(rename = "Path")]
    path: String,
}

impl From<&BackupEntry> for BackupRow {
    fn from(e: &BackupEntry) -> Self {
        Self {
            serial: e.serial,
            modified: e.modified.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            size: e.size,
            path: e.path.display().to_string(),
        }
    }
}

fn manager(settings: &Settings) -> BackupManager {
    BackupManager::new(&settings.backup_dir)
        .with_retention(settings.backups.retention)
        .with_max_age_days(settings.backups.max_age_days)
}

pub fn handle(cmd: ApplyCommand, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let backups = manager(settings);
    match cmd {
        ApplyCommand::Rollback { site, serial } => {
            let live = FileConfigSource::new(settings.clone()).site_path(&site)?;
            let prompt = format!("Replace {} with backup {serial}?", live.display());
            if !util::confirm(&prompt, "rollback", global.yes)? {
                output::print_output("Rollback cancelled.", global.quiet);
                return Ok(());
            }
            let saved = backups.rollback(&live, serial)?;
            output::print_output(
                &format!(
                    "Restored {} from backup {serial}; previous contents saved as {}",
                    live.display(),
                    saved.display()
                ),
                global.quiet,
            );
            Ok(())
        }

        ApplyCommand::ListBackups { site } => {
            let live = FileConfigSource::new(settings.clone()).site_path(&site)?;
            let entries = backups.list_backups(&live)?;
            if entries.is_empty() && global.output == OutputFormat::Table {
                output::print_output(&format!("No backups of {}.", live.display()), global.quiet);
                return Ok(());
            }
            let rendered =
                output::render_list(global.output, &entries, |e: &BackupEntry| BackupRow::from(e))?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ApplyCommand::CleanupBackups { days } => {
            let days = days.unwrap_or(settings.backups.max_age_days);
            let prompt = format!(
                "Delete backups in {} older than {days} day(s)?",
                backups.dir().display()
            );
            if !util::confirm(&prompt, "cleanup-backups", global.yes)? {
                output::print_output("Cleanup cancelled.", global.quiet);
                return Ok(());
            }
            let removed = backups.cleanup_older_than(Some(days))?;
            let mut out = format!("Removed {} backup(s).", removed.len());
            for path in &removed {
                let _ = write!(out, "\n  {}", path.display());
            }
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ApplyCommand::ValidateBackup { path } => {
            let summary = validate_backup(&path)?;
            let rendered = output::render_single(global.output, &summary, summary_detail)?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}

fn summary_detail(summary: &BackupSummary) -> String {
    let mut out = format!(
        "{} is valid (version {}, {} device(s))",
        summary.path.display(),
        summary.version,
        summary.device_count()
    );
    if let Some(stamp) = &summary.last_modified {
        let _ = write!(out, "\nLast modified: {stamp}");
    }
    for site in &summary.sites {
        let _ = write!(
            out,
            "\n  {}: {} AP(s), {} switch(es), {} gateway(s), {} WLAN(s)",
            site.name, site.aps, site.switches, site.gateways, site.wlans
        );
    }
    out
}
