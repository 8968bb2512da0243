//! Resource-pool spec file parsing (YAML or JSON).
//!
//! The on-disk format is a map from resource type name to a list of
//! `{id, slots}` instances, plus a shorthand: a bare `<type>: <count>` entry
//! is expanded into `count` singleton (`slots = 1`) instances named `"0"`
//! through `"<count - 1>"`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::resource::ResourceInstance;

#[derive(Debug, Deserialize)]
struct RawInstance {
    id: String,
    #[serde(default = "default_slots")]
    slots: u32,
}

const fn default_slots() -> u32 {
    1
}

/// One of the two shapes a resource-type entry can take in the spec file:
/// an explicit instance list, or the shorthand instance count.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Instances(Vec<RawInstance>),
    Count(u32),
}

#[derive(Debug, Deserialize, Default)]
struct RawPoolSpec {
    #[serde(default)]
    resources: HashMap<String, Vec<RawInstance>>,
    #[serde(flatten)]
    shorthand: HashMap<String, RawEntry>,
}

/// A fully expanded resource-pool spec: type name to its instance list.
#[derive(Debug, Clone, Default)]
pub struct PoolSpec {
    /// Resource type name to its expanded instances.
    pub resources: HashMap<String, Vec<ResourceInstance>>,
}

impl PoolSpec {
    /// Parse a pool spec from a YAML document.
    pub fn from_yaml_str(input: &str) -> Result<Self, String> {
        let raw: RawPoolSpec = serde_yaml::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        Ok(Self::from_raw(raw))
    }

    /// Parse a pool spec from a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let raw: RawPoolSpec = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawPoolSpec) -> Self {
        let mut resources: HashMap<String, Vec<ResourceInstance>> = raw
            .resources
            .into_iter()
            .map(|(kind, instances)| {
                let expanded = instances.into_iter().map(|i| ResourceInstance { id: i.id, slots: i.slots }).collect();
                (kind, expanded)
            })
            .collect();

        for (kind, entry) in raw.shorthand {
            if kind == "additional_properties" {
                continue;
            }
            match entry {
                RawEntry::Count(count) => {
                    let instances =
                        (0..count).map(|i| ResourceInstance { id: i.to_string(), slots: 1 }).collect();
                    resources.entry(kind).or_insert(instances);
                }
                RawEntry::Instances(instances) => {
                    let expanded =
                        instances.into_iter().map(|i| ResourceInstance { id: i.id, slots: i.slots }).collect();
                    resources.entry(kind).or_insert(expanded);
                }
            }
        }

        Self { resources }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_shorthand_count() {
        let spec = PoolSpec::from_yaml_str("cpus: 4\ngpus: 2\n").unwrap();
        assert_eq!(spec.resources["cpus"].len(), 4);
        assert_eq!(spec.resources["gpus"].len(), 2);
        assert_eq!(spec.resources["cpus"][0].slots, 1);
        assert_eq!(spec.resources["cpus"][3].id, "3");
    }

    #[test]
    fn parses_explicit_instance_list() {
        let yaml = "resources:\n  gpus:\n    - id: gpu0\n      slots: 4\n    - id: gpu1\n      slots: 4\n";
        let spec = PoolSpec::from_yaml_str(yaml).unwrap();
        assert_eq!(spec.resources["gpus"].len(), 2);
        assert_eq!(spec.resources["gpus"][0].slots, 4);
    }

    #[test]
    fn defaults_missing_slots_to_one() {
        let yaml = "resources:\n  nodes:\n    - id: n0\n";
        let spec = PoolSpec::from_yaml_str(yaml).unwrap();
        assert_eq!(spec.resources["nodes"][0].slots, 1);
    }

    #[test]
    fn additional_properties_key_is_ignored() {
        let yaml = "cpus: 2\nadditional_properties:\n  site: westmesa\n";
        let spec = PoolSpec::from_yaml_str(yaml).unwrap();
        assert!(!spec.resources.contains_key("additional_properties"));
        assert_eq!(spec.resources["cpus"].len(), 2);
    }
}
