// ── `_name` → `_id` alias translation ──
//
// Site files may reference named objects (`deviceprofile_name`,
// `rftemplate_name`) instead of opaque IDs. The resolver is built once per
// run from the cache's named objects, for every kind the site mentions.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::managed_keys::{ALIAS_SUFFIX, is_alias_field};
use crate::model::{ConfigDoc, SiteConfiguration};
use crate::source::DeviceCache;

#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    /// kind → name → id
    kinds: HashMap<String, HashMap<String, String>>,
}

impl AliasResolver {
    /// Collect every alias kind used by the site's device configs and load
    /// its named objects once.
    pub fn build(cache: &dyn DeviceCache, api_label: &str, site: &SiteConfiguration) -> Self {
        let mut kinds = BTreeSet::new();
        for devices in [&site.devices.ap, &site.devices.switch, &site.devices.gateway] {
            for config in devices.values() {
                collect_kinds(config, &mut kinds);
            }
        }

        let mut resolver = Self::default();
        for kind in kinds {
            let objects = cache.named_objects(api_label, &kind);
            debug!(api = api_label, kind = %kind, count = objects.len(), "loaded alias objects");
            resolver.insert_kind(&kind, objects.into_iter().map(|o| (o.name, o.id)));
        }
        resolver
    }

    pub fn insert_kind(&mut self, kind: &str, entries: impl IntoIterator<Item = (String, String)>) {
        self.kinds
            .entry(kind.to_owned())
            .or_default()
            .extend(entries);
    }

    pub fn lookup(&self, kind: &str, name: &str) -> Option<&str> {
        self.kinds.get(kind)?.get(name).map(String::as_str)
    }

    /// Add `X_id` next to every string-valued `X_name`, at any depth.
    ///
    /// Returns the first unresolvable alias as an error message.
    pub fn translate(&self, config: &ConfigDoc) -> Result<ConfigDoc, String> {
        let mut out = ConfigDoc::new();
        for (key, value) in config {
            let value = match value {
                Value::Object(child) => Value::Object(self.translate(child)?),
                other => other.clone(),
            };
            if let (true, Value::String(name)) = (is_alias_field(key), &value) {
                let kind = alias_kind(key);
                let id = self
                    .lookup(kind, name)
                    .ok_or_else(|| format!("unknown {kind} '{name}' in field {key}"))?;
                out.insert(key.clone(), value.clone());
                out.insert(format!("{kind}_id"), Value::String(id.to_owned()));
                continue;
            }
            out.insert(key.clone(), value);
        }
        Ok(out)
    }
}

fn alias_kind(key: &str) -> &str {
    &key[..key.len() - ALIAS_SUFFIX.len()]
}

fn collect_kinds(config: &ConfigDoc, kinds: &mut BTreeSet<String>) {
    for (key, value) in config {
        match value {
            Value::String(_) if is_alias_field(key) => {
                kinds.insert(alias_kind(key).to_owned());
            }
            Value::Object(child) => collect_kinds(child, kinds),
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::{ApiSnapshot, MemoryCache};
    use crate::model::{ConfigFile, NamedObject};
    use serde_json::json;

    #[test]
    fn names_resolve_to_ids_from_one_lookup_per_kind() {
        let cache = MemoryCache::new().with_api(
            "mist",
            ApiSnapshot {
                named_objects: HashMap::from([(
                    "deviceprofile".to_string(),
                    vec![NamedObject {
                        id: "dp-1".into(),
                        name: "standard".into(),
                    }],
                )]),
                ..ApiSnapshot::default()
            },
        );
        let file: ConfigFile = serde_json::from_value(json!({ "sites": { "lab": { "devices": {
            "ap": { "aa:bb:cc:dd:ee:01": { "deviceprofile_name": "standard" } },
            "switch": { "aa:bb:cc:dd:ee:02": { "deviceprofile_name": "missing", "name": "sw" } }
        } } } }))
        .unwrap();
        let site = &file.sites["lab"];
        let resolver = AliasResolver::build(&cache, "mist", site);

        let ap = site.devices.ap.values().next().unwrap();
        let translated = resolver.translate(ap).unwrap();
        assert_eq!(translated["deviceprofile_id"], "dp-1");

        let switch = site.devices.switch.values().next().unwrap();
        let err = resolver.translate(switch).unwrap_err();
        assert!(err.contains("unknown deviceprofile 'missing'"));
    }

    #[test]
    fn nested_aliases_are_translated() {
        let mut resolver = AliasResolver::default();
        resolver.insert_kind("rftemplate", [("office".to_string(), "rf-9".to_string())]);
        let config = json!({ "radio": { "rftemplate_name": "office" }, "name": "ap" });
        let translated = resolver.translate(config.as_object().unwrap()).unwrap();
        assert_eq!(translated["radio"]["rftemplate_id"], "rf-9");
        assert_eq!(translated["name"], "ap");
    }
}
