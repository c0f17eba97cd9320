// ── Managed-key comparator ──
//
// Partial field ownership: a `ManagedKeySpec` lists the dot-paths this
// tool may compare and write for one API + device type. Everything
// outside those paths belongs to someone else (the vendor dashboard,
// another tool) and must never show up as drift or be sent in an update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ConfigDoc;

/// Top-level fields never compared in full-comparison mode: identity,
/// hardware, timestamps and connection status.
pub const EXCLUDED_FIELDS: &[&str] = &[
    "id",
    "mac",
    "serial",
    "model",
    "type",
    "site_id",
    "org_id",
    "created_time",
    "modified_time",
    "last_seen",
    "timestamp",
    "uptime",
    "status",
    "connected",
    "ip",
];

/// Suffix of alias fields (`deviceprofile_name`) that are translated to
/// their `_id` form before comparison.
pub const ALIAS_SUFFIX: &str = "_name";

/// Whether a key is a `_name` alias field.
pub fn is_alias_field(key: &str) -> bool {
    key.len() > ALIAS_SUFFIX.len() && key.ends_with(ALIAS_SUFFIX)
}

// ── ManagedKeySpec ──────────────────────────────────────────────────

/// Ordered list of dot-paths scoping which fields may be compared and written.
///
/// A `*` segment matches exactly one path segment. An empty spec means
/// full ownership (everything but the fixed exclusion set).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedKeySpec {
    keys: Vec<String>,
}

impl ManagedKeySpec {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::default();
        for key in keys {
            spec = spec.with_key(key);
        }
        spec
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add a key if not already present.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        let key = key.trim().to_owned();
        if !key.is_empty() && !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    /// Extend with the owned key only when the spec is partial.
    pub fn with_owned_key(self, key: &str) -> Self {
        if self.is_empty() {
            self
        } else {
            self.with_key(key)
        }
    }

    /// For every managed `X_name` alias, also manage its translated `X_id`.
    pub fn with_alias_ids(self) -> Self {
        let ids: Vec<String> = self
            .keys
            .iter()
            .filter(|k| is_alias_field(k))
            .map(|k| format!("{}_id", &k[..k.len() - ALIAS_SUFFIX.len()]))
            .collect();
        ids.into_iter().fold(self, Self::with_key)
    }

    /// The path lies at or below a managed key (direct, parent-prefix or wildcard match).
    pub fn matches(&self, path: &[&str]) -> bool {
        self.keys.iter().any(|key| {
            let segments: Vec<&str> = key.split('.').collect();
            segments.len() <= path.len() && segments_match(&segments, path)
        })
    }

    /// The path is a strict ancestor of some managed key, so its subtree
    /// must be walked rather than compared whole.
    pub fn is_ancestor(&self, path: &[&str]) -> bool {
        self.keys.iter().any(|key| {
            let segments: Vec<&str> = key.split('.').collect();
            segments.len() > path.len() && segments_match(&segments[..path.len()], path)
        })
    }
}

fn segments_match(pattern: &[&str], path: &[&str]) -> bool {
    pattern
        .iter()
        .zip(path)
        .all(|(want, got)| *want == "*" || want == got)
}

// ── Comparison ──────────────────────────────────────────────────────

/// Returns `true` when `current` diverges from `desired` within the
/// managed scope.
pub fn compare(current: &ConfigDoc, desired: &ConfigDoc, spec: &ManagedKeySpec) -> bool {
    if spec.is_empty() {
        let current = strip_excluded(current);
        let desired = strip_excluded(desired);
        return !docs_equal(&current, &desired);
    }
    diverges_within(Some(current), desired, spec, &mut Vec::new())
}

fn diverges_within<'a>(
    current: Option<&ConfigDoc>,
    desired: &'a ConfigDoc,
    spec: &ManagedKeySpec,
    prefix: &mut Vec<&'a str>,
) -> bool {
    for (key, want) in desired {
        if is_alias_field(key) {
            continue;
        }
        prefix.push(key.as_str());
        let have = current.and_then(|c| c.get(key));
        let diverged = if spec.matches(prefix) {
            !have.is_some_and(|have| values_equal(have, want))
        } else if spec.is_ancestor(prefix) {
            match want {
                Value::Object(child) => {
                    diverges_within(have.and_then(Value::as_object), child, spec, prefix)
                }
                _ => false,
            }
        } else {
            false
        };
        prefix.pop();
        if diverged {
            return true;
        }
    }
    false
}

/// Structural equality with numeric comparison by value (`10 == 10.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => docs_equal(x, y),
        _ => a == b,
    }
}

fn docs_equal(a: &ConfigDoc, b: &ConfigDoc) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
}

// ── Projection ──────────────────────────────────────────────────────

/// Project a config down to its managed paths, preserving nesting.
///
/// Ancestor maps left empty after projection are dropped. Idempotent.
pub fn filter_by_managed_keys(config: &ConfigDoc, spec: &ManagedKeySpec) -> ConfigDoc {
    if spec.is_empty() {
        return strip_excluded(config);
    }
    project(config, spec, &mut Vec::new())
}

fn project<'a>(
    config: &'a ConfigDoc,
    spec: &ManagedKeySpec,
    prefix: &mut Vec<&'a str>,
) -> ConfigDoc {
    let mut out = ConfigDoc::new();
    for (key, value) in config {
        if is_alias_field(key) {
            continue;
        }
        prefix.push(key.as_str());
        if spec.matches(prefix) {
            out.insert(key.clone(), value.clone());
        } else if spec.is_ancestor(prefix) {
            if let Value::Object(child) = value {
                let child = project(child, spec, prefix);
                if !child.is_empty() {
                    out.insert(key.clone(), Value::Object(child));
                }
            }
        }
        prefix.pop();
    }
    out
}

/// Remove the fixed exclusion set (top level) and `_name` aliases (any level).
pub fn strip_excluded(config: &ConfigDoc) -> ConfigDoc {
    config
        .iter()
        .filter(|(k, _)| !EXCLUDED_FIELDS.contains(&k.as_str()))
        .filter(|(k, _)| !is_alias_field(k))
        .map(|(k, v)| (k.clone(), strip_aliases(v)))
        .collect()
}

fn strip_aliases(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !is_alias_field(k))
                .map(|(k, v)| (k.clone(), strip_aliases(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_aliases).collect()),
        other => other.clone(),
    }
}

/// Overlay `overlay` onto `base`, merging nested objects key by key.
pub fn deep_merge(base: &mut ConfigDoc, overlay: &ConfigDoc) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> ConfigDoc {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn managed_power_change_is_detected_and_projected() {
        let spec = ManagedKeySpec::new(["radio_config.band_5.power"]);
        let current = doc(json!({
            "name": "ap-old",
            "radio_config": { "band_5": { "power": 10, "channel": 36 } }
        }));
        let desired = doc(json!({
            "name": "ap-new",
            "radio_config": { "band_5": { "power": 17 } }
        }));

        assert!(compare(&current, &desired, &spec));
        assert_eq!(
            Value::Object(filter_by_managed_keys(&desired, &spec)),
            json!({ "radio_config": { "band_5": { "power": 17 } } })
        );
    }

    #[test]
    fn unmanaged_difference_is_not_divergence() {
        let spec = ManagedKeySpec::new(["radio_config.band_5.power"]);
        let current = doc(json!({ "name": "a", "radio_config": { "band_5": { "power": 17 } } }));
        let desired = doc(json!({ "name": "b", "radio_config": { "band_5": { "power": 17.0 } } }));
        assert!(!compare(&current, &desired, &spec));
    }

    #[test]
    fn parent_prefix_owns_whole_subtree() {
        let spec = ManagedKeySpec::new(["radio_config"]);
        let current = doc(json!({ "radio_config": { "band_5": { "power": 17 }, "band_24": {} } }));
        let desired = doc(json!({ "radio_config": { "band_5": { "power": 17 } } }));
        // band_24 exists only in current but lies inside the managed subtree.
        assert!(compare(&current, &desired, &spec));
    }

    #[test]
    fn current_only_field_outside_declared_scope_is_ignored() {
        let spec = ManagedKeySpec::new(["name", "radio_config.band_5.power"]);
        let current = doc(json!({ "name": "ap", "radio_config": { "band_5": { "power": 5 } } }));
        let desired = doc(json!({ "name": "ap" }));
        assert!(!compare(&current, &desired, &spec));
    }

    #[test]
    fn wildcard_segment_matches_any_port() {
        let spec = ManagedKeySpec::new(["port_config.*.vlan_id"]);
        let current = doc(json!({
            "port_config": { "ge-0/0/1": { "vlan_id": 10, "poe": true } }
        }));
        let desired = doc(json!({
            "port_config": { "ge-0/0/1": { "vlan_id": 20, "poe": false } }
        }));
        assert!(compare(&current, &desired, &spec));
        assert_eq!(
            Value::Object(filter_by_managed_keys(&desired, &spec)),
            json!({ "port_config": { "ge-0/0/1": { "vlan_id": 20 } } })
        );
    }

    #[test]
    fn missing_current_value_is_divergence() {
        let spec = ManagedKeySpec::new(["name"]);
        let desired = doc(json!({ "name": "ap-1" }));
        assert!(compare(&ConfigDoc::new(), &desired, &spec));
    }

    #[test]
    fn empty_spec_is_full_comparison_minus_exclusions() {
        let spec = ManagedKeySpec::default();
        let current = doc(json!({
            "id": "abc", "serial": "Q2", "status": "online", "name": "ap",
            "deviceprofile_name": "x", "vars": { "a": 1 }
        }));
        let desired = doc(json!({ "name": "ap", "vars": { "a": 1.0 } }));
        assert!(!compare(&current, &desired, &spec));

        let drifted = doc(json!({ "name": "ap", "vars": { "a": 1, "b": 2 } }));
        assert!(compare(&current, &drifted, &spec));

        let extra_current = doc(json!({ "name": "ap", "vars": { "a": 1 }, "notes": "x" }));
        assert!(compare(&extra_current, &desired, &spec));
    }

    #[test]
    fn filter_is_idempotent() {
        let spec = ManagedKeySpec::new(["name", "radio_config.*.power", "port_config"]);
        let config = doc(json!({
            "name": "sw", "notes": "drop",
            "radio_config": {
                "band_24": { "power": 8, "channel": 1 },
                "band_5": { "channel": 36 }
            },
            "port_config": { "ge-0/0/1": { "usage": "ap" } },
            "deviceprofile_name": "default"
        }));
        let once = filter_by_managed_keys(&config, &spec);
        let twice = filter_by_managed_keys(&once, &spec);
        assert_eq!(once, twice);
        assert_eq!(
            Value::Object(once),
            json!({
                "name": "sw",
                "radio_config": { "band_24": { "power": 8 } },
                "port_config": { "ge-0/0/1": { "usage": "ap" } }
            })
        );
    }

    #[test]
    fn alias_ids_follow_managed_names() {
        let spec = ManagedKeySpec::new(["deviceprofile_name", "name"]).with_alias_ids();
        assert_eq!(
            spec.keys(),
            &["deviceprofile_name", "name", "deviceprofile_id"]
        );
        assert!(spec.matches(&["deviceprofile_id"]));
    }

    #[test]
    fn owned_key_leaves_full_spec_untouched() {
        assert!(ManagedKeySpec::default().with_owned_key("tags").is_empty());
        let partial = ManagedKeySpec::new(["name"]).with_owned_key("tags");
        assert!(partial.matches(&["tags"]));
    }

    #[test]
    fn deep_merge_overlays_nested_objects() {
        let mut base = doc(json!({ "auth": { "type": "psk" }, "vlan_id": 1 }));
        deep_merge(&mut base, &doc(json!({ "auth": { "psk": "x" }, "vlan_id": 2 })));
        assert_eq!(
            Value::Object(base),
            json!({ "auth": { "type": "psk", "psk": "x" }, "vlan_id": 2 })
        );
    }
}
