// ── Switch specifics ──

/// Switches carry no site-file bindings.
pub const BINDING_KEYS: &[&str] = &[];

/// Live-only fields reported by the controller.
pub const STATUS_KEYS: &[&str] = &[
    "if_stat",
    "port_stat",
    "clients",
    "module_stat",
    "fw_versions_outofsync",
];
