use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Error, Lockfile, LockfileEntry, LockfileFragment, LockfileSubset, Package};

type Map<K, V> = std::collections::BTreeMap<K, V>;

// The lockfile version we write, `dependencies` are never written so the
// result is only valid as a v3 lockfile.
const ENCODED_LOCKFILE_VERSION: i32 = 3;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct NpmLockfile {
    #[serde(rename = "lockfileVersion")]
    lockfile_version: i32,
    #[serde(default)]
    packages: Map<String, LockfileEntry>,
    // We parse this so it doesn't end up in 'other' and we don't need to worry
    // about accidentally serializing it.
    #[serde(skip_serializing, default)]
    dependencies: Map<String, Value>,
    // We want to reserialize any additional fields, but we don't use them
    // we keep them as raw values to avoid describing the correct schema.
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl Lockfile for NpmLockfile {
    fn resolve_package(
        &self,
        workspace_path: &str,
        name: &str,
        _version: &str,
    ) -> Result<Option<Package>, Error> {
        if !self.packages.contains_key(workspace_path) {
            return Err(Error::MissingWorkspace(workspace_path.to_string()));
        }

        let possible_keys = [
            // all_dependencies returns full keys so a transitive dependency is
            // never resolved to the wrong copy
            name.to_string(),
            // a copy nested under the workspace wins over the hoisted one
            format!("{}/node_modules/{}", workspace_path, name),
            format!("node_modules/{}", name),
        ];
        possible_keys
            .into_iter()
            .filter_map(|key| {
                self.packages.get(&key).map(|pkg| {
                    let version = pkg.version.clone().unwrap_or_default();
                    Ok(Package { key, version })
                })
            })
            .next()
            .transpose()
    }

    fn all_dependencies(&self, key: &str) -> Result<Option<HashMap<String, String>>, Error> {
        self.packages
            .get(key)
            .map(|pkg| {
                pkg.dep_keys()
                    .filter_map(|name| {
                        Self::possible_npm_deps(key, name)
                            .into_iter()
                            .find_map(|possible_key| {
                                let entry = self.packages.get(&possible_key)?;
                                match entry.version.as_deref() {
                                    Some(version) => Some(Ok((possible_key, version.to_string()))),
                                    None if entry.resolved.is_some() => None,
                                    None => Some(Err(Error::MissingVersion(possible_key.clone()))),
                                }
                            })
                    })
                    .collect()
            })
            .transpose()
    }

    fn entry(&self, key: &str) -> Option<&LockfileEntry> {
        self.packages.get(key)
    }

    fn workspace_entries(&self, workspace_path: &str) -> LockfileFragment {
        let mut entries = LockfileFragment::new();
        // The root entry is written for every subset
        if workspace_path.is_empty() {
            return entries;
        }
        if let Some(entry) = self.packages.get(workspace_path) {
            entries.insert(workspace_path.to_string(), entry.clone());
        }
        // npm links each workspace into the top level node_modules
        if let Some((key, entry)) = self
            .packages
            .iter()
            .find(|(_, entry)| entry.resolved.as_deref() == Some(workspace_path))
        {
            entries.insert(key.clone(), entry.clone());
        }
        entries
    }

    fn encode_subset(&self, subset: &LockfileSubset) -> Result<Vec<u8>, Error> {
        let mut packages = subset.entries().clone();
        if let Some(root) = self.packages.get("") {
            packages.insert("".into(), root.clone());
        }
        let pruned = Self {
            lockfile_version: ENCODED_LOCKFILE_VERSION,
            packages,
            dependencies: Map::default(),
            other: self.other.clone(),
        };
        let mut encoded = serde_json::to_vec_pretty(&pruned)?;
        encoded.push(b'\n');
        Ok(encoded)
    }
}

impl NpmLockfile {
    pub fn load(content: &[u8]) -> Result<Self, Error> {
        let lockfile: NpmLockfile = serde_json::from_slice(content)?;

        // We don't support lockfiles without 'packages' as older versions
        // required reading through the contents of node_modules in order
        // to resolve dependencies.
        if lockfile.lockfile_version <= 1
            || (lockfile.packages.is_empty() && !lockfile.dependencies.is_empty())
        {
            Err(Error::UnsupportedNpmVersion)
        } else {
            Ok(lockfile)
        }
    }

    fn possible_npm_deps(key: &str, dep: &str) -> Vec<String> {
        let mut possible_deps = vec![format!("{key}/node_modules/{dep}")];

        let mut curr = Some(key);
        while let Some(key) = curr {
            let next = Self::npm_path_parent(key);
            possible_deps.push(format!("{}node_modules/{}", next.unwrap_or(""), dep));
            curr = next;
        }

        possible_deps
    }

    fn npm_path_parent(key: &str) -> Option<&str> {
        key.rsplit_once("node_modules/")
            .map(|(first, _)| first)
            .and_then(|parent| {
                if parent.is_empty() {
                    None
                } else {
                    Some(parent)
                }
            })
    }
}
