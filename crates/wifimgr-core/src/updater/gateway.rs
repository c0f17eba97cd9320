// ── Gateway specifics ──

pub const BINDING_KEYS: &[&str] = &[];

/// Live-only fields reported by the controller.
pub const STATUS_KEYS: &[&str] = &[
    "if_stat",
    "tunnels",
    "service_stat",
    "route_summary_stats",
    "cluster_stat",
];
