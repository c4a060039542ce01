mod identifiers;

use std::collections::HashMap;

use itertools::Itertools;
use serde::Deserialize;
use tracing::debug;

use self::identifiers::Descriptor;
use crate::{Error, Lockfile, LockfileEntry, LockfileFragment, LockfileSubset, Package};

// We depend on BTree iteration being sorted for correct serialization
type Map<K, V> = std::collections::BTreeMap<K, V>;

const METADATA_KEY: &str = "__metadata";
const ROOT_WORKSPACE: &str = ".";

/// The `__metadata` block at the top of a berry lockfile
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BerryMetadata {
    #[serde(deserialize_with = "string_or_num")]
    pub version: String,
    #[serde(default, deserialize_with = "optional_string_or_num")]
    pub cache_key: Option<String>,
}

#[derive(Debug)]
pub struct BerryLockfile {
    metadata: BerryMetadata,
    entries: Map<String, LockfileEntry>,
    // every descriptor in a key to the full key
    descriptors: HashMap<String, String>,
    // descriptors with their protocol stripped to the descriptor found in the
    // lockfile, package.json ranges are usually written without one
    resolver: HashMap<(String, String), String>,
}

impl BerryLockfile {
    pub fn load(contents: &[u8]) -> Result<Self, Error> {
        let mut raw: Map<String, serde_yaml::Value> = serde_yaml::from_slice(contents)?;
        let metadata = raw
            .remove(METADATA_KEY)
            .map(serde_yaml::from_value::<BerryMetadata>)
            .transpose()?
            .ok_or_else(|| Error::MissingPackage(METADATA_KEY.to_string()))?;
        let entries = raw
            .into_iter()
            .map(|(key, value)| Ok((key, serde_yaml::from_value::<LockfileEntry>(value)?)))
            .collect::<Result<Map<_, _>, Error>>()?;
        Ok(Self::new(metadata, entries))
    }

    fn new(metadata: BerryMetadata, entries: Map<String, LockfileEntry>) -> Self {
        let mut descriptors = HashMap::new();
        let mut resolver = HashMap::new();
        for key in entries.keys() {
            for raw in key.split(", ") {
                descriptors.insert(raw.to_string(), key.clone());
                let Some(descriptor) = Descriptor::parse(raw) else {
                    debug!("unable to parse berry descriptor '{raw}'");
                    continue;
                };
                if descriptor.is_patch() {
                    // package.json declares patches without the bind
                    // parameters yarn adds to the lockfile key
                    let unbound = Descriptor::strip_params(raw);
                    if unbound != raw {
                        descriptors
                            .entry(unbound.to_string())
                            .or_insert_with(|| key.clone());
                    }
                    continue;
                }
                resolver.insert(
                    (
                        descriptor.name.to_string(),
                        descriptor.range_without_protocol().to_string(),
                    ),
                    raw.to_string(),
                );
            }
        }
        Self {
            metadata,
            entries,
            descriptors,
            resolver,
        }
    }

    pub fn metadata(&self) -> &BerryMetadata {
        &self.metadata
    }

    fn package_for_key(&self, key: &str) -> Result<Package, Error> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| Error::MissingPackage(key.to_string()))?;
        let version = entry
            .version
            .clone()
            .ok_or_else(|| Error::MissingVersion(key.to_string()))?;
        Ok(Package::new(key, version))
    }

    fn workspace_keys<'a>(&'a self, workspace_path: &'a str) -> impl Iterator<Item = &'a String> {
        let path = match workspace_path {
            "" => ROOT_WORKSPACE,
            path => path,
        };
        self.entries.keys().filter(move |key| {
            key.split(", ").any(|raw| {
                Descriptor::parse(raw)
                    .and_then(|d| d.range.strip_prefix("workspace:"))
                    .map_or(false, |p| p == path)
            })
        })
    }
}

impl Lockfile for BerryLockfile {
    fn resolve_package(
        &self,
        _workspace_path: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Package>, Error> {
        let descriptor = format!("{name}@{version}");
        let raw = if self.descriptors.contains_key(&descriptor) {
            descriptor
        } else {
            let stripped = Descriptor::strip_protocol(version);
            match self.resolver.get(&(name.to_string(), stripped.to_string())) {
                Some(raw) => raw.clone(),
                None => return Ok(None),
            }
        };
        let Some(key) = self.descriptors.get(&raw) else {
            return Ok(None);
        };
        self.package_for_key(key).map(Some)
    }

    fn all_dependencies(&self, key: &str) -> Result<Option<HashMap<String, String>>, Error> {
        Ok(self.entries.get(key).map(LockfileEntry::installed_dependencies))
    }

    fn entry(&self, key: &str) -> Option<&LockfileEntry> {
        self.entries.get(key)
    }

    fn companion_packages(&self, key: &str) -> Vec<Package> {
        let descriptors = key
            .split(", ")
            .filter_map(Descriptor::parse)
            .collect::<Vec<_>>();

        // a patched package can't be installed without the package it patches
        let originals = descriptors
            .iter()
            .filter_map(Descriptor::patched_descriptor)
            .filter_map(|raw| self.descriptors.get(&raw));

        let prefixes = descriptors
            .iter()
            .filter(|d| !d.is_patch())
            .map(Descriptor::patch_prefix)
            .collect::<Vec<_>>();
        let patches = self
            .descriptors
            .iter()
            .filter(|(raw, _)| prefixes.iter().any(|prefix| raw.starts_with(prefix.as_str())))
            .map(|(_, patch_key)| patch_key);

        originals
            .chain(patches)
            .filter_map(|companion| self.package_for_key(companion).ok())
            .sorted()
            .dedup()
            .collect()
    }

    fn workspace_entries(&self, workspace_path: &str) -> LockfileFragment {
        self.workspace_keys(workspace_path)
            .filter_map(|key| Some((key.clone(), self.entries.get(key)?.clone())))
            .collect()
    }

    fn patch_files(&self, subset: &LockfileSubset) -> Vec<String> {
        subset
            .keys()
            .flat_map(|key| key.split(", "))
            .filter_map(Descriptor::parse)
            .filter_map(|descriptor| descriptor.patch_file())
            .sorted()
            .dedup()
            .collect()
    }

    fn encode_subset(&self, subset: &LockfileSubset) -> Result<Vec<u8>, Error> {
        let mut entries = subset.entries().clone();
        entries.extend(self.workspace_entries(""));
        Ok(serde_yaml::to_string(&entries)?.into_bytes())
    }
}

// Metadata values are usually plain integers, e.g. `version: 6`
fn string_or_num<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNum {
        String(String),
        Num(u64),
    }

    match StringOrNum::deserialize(deserializer)? {
        StringOrNum::String(s) => Ok(s),
        StringOrNum::Num(x) => Ok(x.to_string()),
    }
}

fn optional_string_or_num<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    string_or_num(deserializer).map(Some)
}
