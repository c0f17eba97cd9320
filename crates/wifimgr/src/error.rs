//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and settings errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use wifimgr_config::ConfigError;
use wifimgr_core::{ApiError, CoreError};

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const PARTIAL: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(wifimgr::not_found), help("{hint}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wifimgr::validation))]
    Validation { field: String, reason: String },

    #[error("{message}")]
    #[diagnostic(
        code(wifimgr::config),
        help("Fix the site configuration file; nothing was changed.")
    )]
    Configuration { message: String },

    #[error(transparent)]
    #[diagnostic(code(wifimgr::settings))]
    Settings(#[from] ConfigError),

    // ── Safety ───────────────────────────────────────────────────────

    #[error("Refusing to touch {count} device(s) missing from an inventory: {macs}")]
    #[diagnostic(
        code(wifimgr::safety_gate),
        help(
            "Add the devices to the local inventory file, or check that they\n\
             are claimed in the vendor organization."
        )
    )]
    SafetyGate { count: usize, macs: String },

    #[error("{failed} of {attempted} device update(s) failed:\n{details}")]
    #[diagnostic(
        code(wifimgr::partial_update),
        help("Restore the previous configuration with: {rollback_command}")
    )]
    PartialUpdate {
        attempted: usize,
        failed: usize,
        details: String,
        rollback_command: String,
    },

    // ── Unsupported ──────────────────────────────────────────────────

    #[error("Operation '{operation}' is not supported here")]
    #[diagnostic(code(wifimgr::unsupported), help("This requires {required}."))]
    Unsupported { operation: String, required: String },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("API error: {message}")]
    #[diagnostic(code(wifimgr::api_error))]
    Api { message: String },

    #[error("Backup error: {message}")]
    #[diagnostic(code(wifimgr::backup))]
    Backup { message: String },

    #[error("Apply cancelled before {phase}")]
    #[diagnostic(
        code(wifimgr::cancelled),
        help("Mutations already sent before cancellation were not reverted.")
    )]
    Cancelled { phase: String },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(wifimgr::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(wifimgr::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::Settings(ConfigError::NotFound { .. }) => {
                exit_code::NOT_FOUND
            }
            Self::Validation { .. }
            | Self::Configuration { .. }
            | Self::Settings(_)
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::SafetyGate { .. } | Self::PartialUpdate { .. } => exit_code::PARTIAL,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SiteNotConfigured { name } => CliError::NotFound {
                resource_type: "site".into(),
                identifier: name,
                hint: "Check the site files under config_dir in your settings.".into(),
            },
            CoreError::SiteNotFound { name } => CliError::NotFound {
                resource_type: "site".into(),
                identifier: name,
                hint: "The site is not known to the controller. \
                       Refresh the cache with 'refresh-api'."
                    .into(),
            },
            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                hint: "Refresh the cache with 'refresh-api'.".into(),
            },

            err @ (CoreError::Config { .. }
            | CoreError::InvalidConfigFile { .. }
            | CoreError::WlanValidation { .. }) => CliError::Configuration {
                message: err.to_string(),
            },
            CoreError::InvalidMac { raw } => CliError::Validation {
                field: "mac".into(),
                reason: format!("'{raw}' is not a MAC address"),
            },

            CoreError::SafetyGate { macs } => CliError::SafetyGate {
                count: macs.len(),
                macs: macs.join(", "),
            },
            CoreError::PartialUpdate {
                attempted,
                failures,
                rollback_command,
            } => CliError::PartialUpdate {
                attempted,
                failed: failures.len(),
                details: failures
                    .iter()
                    .map(|f| format!("  - {}: {}", f.mac, f.reason))
                    .collect::<Vec<_>>()
                    .join("\n"),
                rollback_command,
            },

            CoreError::Unsupported {
                operation,
                required,
            } => CliError::Unsupported {
                operation,
                required,
            },
            CoreError::Api(ApiError::Unsupported(operation)) => CliError::Unsupported {
                operation,
                required: "an API that supports it".into(),
            },
            CoreError::Api(ApiError::ReadOnly(operation)) => CliError::Unsupported {
                operation,
                required: "a live vendor client".into(),
            },
            CoreError::Api(ApiError::NotFound { entity, identifier }) => CliError::NotFound {
                resource_type: entity,
                identifier,
                hint: "Refresh the cache with 'refresh-api'.".into(),
            },
            CoreError::Api(other) => CliError::Api {
                message: other.to_string(),
            },

            CoreError::Backup { message } => CliError::Backup { message },
            CoreError::Cancelled { phase } => CliError::Cancelled { phase },
            CoreError::Io { path, source } => CliError::Io(std::io::Error::new(
                source.kind(),
                format!("{}: {source}", path.display()),
            )),
            CoreError::Json(e) => CliError::Json(e),
        }
    }
}
