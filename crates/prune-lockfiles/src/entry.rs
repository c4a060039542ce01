use std::collections::{BTreeMap, HashMap};

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

type Map<K, V> = BTreeMap<K, V>;

/// The resolution record for a single lockfile key.
///
/// The fields every dialect shares are modeled explicitly, anything else is
/// kept as raw values in `other` so it survives a round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockfileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_map"
    )]
    pub dependencies: Option<Map<String, String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_map"
    )]
    pub optional_dependencies: Option<Map<String, String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_map"
    )]
    pub dev_dependencies: Option<Map<String, String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_map"
    )]
    pub peer_dependencies: Option<Map<String, String>>,
    // We want to reserialize any additional fields, but we don't use them
    // we keep them as raw values to avoid describing the correct schema.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl LockfileEntry {
    /// Names of all direct dependencies regardless of kind
    pub fn dep_keys(&self) -> impl Iterator<Item = &String> {
        [
            &self.dependencies,
            &self.dev_dependencies,
            &self.optional_dependencies,
            &self.peer_dependencies,
        ]
        .into_iter()
        .flatten()
        .flat_map(|deps| deps.keys())
    }

    /// Dependencies that an install of this package will pull in
    pub fn installed_dependencies(&self) -> HashMap<String, String> {
        self.dependencies
            .iter()
            .chain(self.optional_dependencies.iter())
            .flatten()
            .map(|(name, range)| (name.clone(), range.clone()))
            .collect()
    }
}

// Lockfile dependency maps are always strings to the package manager, but a
// YAML reader will happily turn `foo: 1` into a number.
fn string_map<'de, D>(deserializer: D) -> Result<Option<Map<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Map<String, Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    raw.into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            Value::Number(n) => Ok((name, n.to_string())),
            Value::Bool(b) => Ok((name, b.to_string())),
            other => Err(de::Error::custom(format!(
                "expected a version for dependency '{name}', found {other}"
            ))),
        })
        .collect::<Result<_, _>>()
        .map(Some)
}
