//! Clap derive structures for the `wifimgr` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wifimgr -- configuration-as-code for multi-vendor wireless networks
#[derive(Debug, Parser)]
#[command(
    name = "wifimgr",
    version,
    about = "Apply declarative site configurations to wireless controllers",
    long_about = "Reconciles declarative site files against controller state.\n\n\
        Only managed fields are compared and written, and a device is only\n\
        touched when it is present in both the vendor inventory and the\n\
        local inventory allowlist.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "WIFIMGR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Exported cache snapshot (overrides `cache_file` in settings)
    #[arg(long, env = "WIFIMGR_CACHE", global = true)]
    pub cache: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WIFIMGR_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile a site, or manage its configuration backups
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Apply ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true,
    after_help = "Examples:\n  \
        wifimgr apply lab ap diff\n  \
        wifimgr apply lab all diff split\n  \
        wifimgr apply rollback lab 1"
)]
pub struct ApplyArgs {
    #[command(subcommand)]
    pub command: Option<ApplyCommand>,

    #[command(flatten)]
    pub run: ApplyRunArgs,
}

#[derive(Debug, Args)]
pub struct ApplyRunArgs {
    /// Site name as declared in the site configuration files
    #[arg(required = true)]
    pub site: Option<String>,

    /// Device type to reconcile: ap, switch, gateway or all
    #[arg(required = true)]
    pub target: Option<String>,

    /// Run modifiers
    #[arg(value_enum)]
    pub modes: Vec<ApplyMode>,

    /// Bypass the unchanged-file skip and inventory exclusion
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApplyMode {
    /// Preview changes without applying them
    Diff,
    /// Report each device type separately
    Split,
    /// Refresh the cache from the vendor API first
    RefreshApi,
}

#[derive(Debug, Subcommand)]
pub enum ApplyCommand {
    /// Swap a site's configuration file with one of its backups
    Rollback {
        /// Site whose configuration file is restored
        site: String,

        /// Backup serial (0 is the newest)
        #[arg(default_value = "0")]
        serial: usize,
    },

    /// List the backups of a site's configuration file
    ListBackups {
        /// Site whose backups are listed
        site: String,
    },

    /// Delete backups older than the retention age
    CleanupBackups {
        /// Maximum age in days (defaults to `backups.max_age_days`)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Check the structure of a backup file
    ValidateBackup {
        /// Backup file to check
        path: PathBuf,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
