// ── Core error types ──
//
// User-facing errors from wifimgr-core. Vendor clients report failures
// through `ApiError`; the `From<ApiError>` impl translates them into
// domain-appropriate variants so consumers never match on transport detail.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure reported by a vendor API client or the cache collaborator.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    #[error("operation not supported by this API: {0}")]
    Unsupported(String),

    #[error("client is read-only: {0}")]
    ReadOnly(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A single device that failed during a best-effort batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub mac: String,
    pub reason: String,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Site not found in configuration: {name}")]
    SiteNotConfigured { name: String },

    #[error("Invalid configuration file {path}: {message}")]
    InvalidConfigFile { path: PathBuf, message: String },

    #[error("WLAN reference validation failed:\n  - {}", .violations.join("\n  - "))]
    WlanValidation { violations: Vec<String> },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Site not found: {name}")]
    SiteNotFound { name: String },

    #[error("Invalid MAC address: {raw}")]
    InvalidMac { raw: String },

    // ── Safety errors ────────────────────────────────────────────────
    #[error(
        "Safety gate violation: {} device(s) not present in both inventories: {}",
        .macs.len(),
        .macs.join(", ")
    )]
    SafetyGate { macs: Vec<String> },

    #[error(
        "{} of {attempted} device update(s) failed:\n{}\n\
         Restore the previous configuration with: {rollback_command}",
        .failures.len(),
        format_failures(.failures)
    )]
    PartialUpdate {
        attempted: usize,
        failures: Vec<DeviceFailure>,
        rollback_command: String,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    #[error("API error: {0}")]
    Api(ApiError),

    #[error("Backup error: {message}")]
    Backup { message: String },

    #[error("Apply cancelled before {phase}")]
    Cancelled { phase: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the configuration class (raised before
    /// any mutation is attempted).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::SiteNotConfigured { .. }
                | Self::InvalidConfigFile { .. }
                | Self::WlanValidation { .. }
                | Self::Unsupported { .. }
        )
    }
}

fn format_failures(failures: &[DeviceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {}: {}", f.mac, f.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Conversion from collaborator errors ──────────────────────────────

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound { entity, identifier } if entity == "site" => {
                CoreError::SiteNotFound { name: identifier }
            }
            ApiError::NotFound { entity, identifier } if entity == "device" => {
                CoreError::DeviceNotFound { identifier }
            }
            ApiError::Unsupported(operation) => CoreError::Unsupported {
                operation,
                required: "a vendor API with this capability".into(),
            },
            other => CoreError::Api(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_names_every_failure_and_rollback() {
        let err = CoreError::PartialUpdate {
            attempted: 3,
            failures: vec![
                DeviceFailure {
                    mac: "aa:bb:cc:dd:ee:01".into(),
                    reason: "timeout".into(),
                },
                DeviceFailure {
                    mac: "aa:bb:cc:dd:ee:02".into(),
                    reason: "rejected".into(),
                },
            ],
            rollback_command: "wifimgr apply rollback lab".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("2 of 3 device update(s) failed"));
        assert!(text.contains("aa:bb:cc:dd:ee:01: timeout"));
        assert!(text.contains("aa:bb:cc:dd:ee:02: rejected"));
        assert!(text.contains("wifimgr apply rollback lab"));
    }

    #[test]
    fn api_not_found_site_maps_to_site_not_found() {
        let err: CoreError = ApiError::NotFound {
            entity: "site".into(),
            identifier: "lab".into(),
        }
        .into();
        assert!(matches!(err, CoreError::SiteNotFound { name } if name == "lab"));
    }

    #[test]
    fn wlan_validation_is_configuration_class() {
        let err = CoreError::WlanValidation {
            violations: vec!["a".into(), "b".into()],
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("  - a\n  - b"));
    }
}
