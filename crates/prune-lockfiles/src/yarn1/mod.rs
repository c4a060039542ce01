use std::collections::HashMap;

use crate::{Lockfile, LockfileEntry, LockfileSubset, Package};

mod de;

type Map<K, V> = std::collections::BTreeMap<K, V>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to parse: {0}")]
    SymlParse(String),
    #[error("unable to convert to structured syml: {0}")]
    SymlStructure(#[from] serde_json::Error),
}

/// A yarn v1 lockfile
///
/// Entries are keyed by the full header of their block, descriptors that
/// share a block are all indexed so `name@range` lookups find it.
#[derive(Debug)]
pub struct Yarn1Lockfile {
    inner: Map<String, LockfileEntry>,
    key_to_entry: HashMap<String, String>,
}

impl Yarn1Lockfile {
    pub fn from_bytes(input: &[u8]) -> Result<Self, crate::Error> {
        let input = std::str::from_utf8(input)
            .map_err(|e| Error::SymlParse(format!("lockfile is not valid utf8: {e}")))?;
        Self::from_str(input)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str) -> Result<Self, crate::Error> {
        let value = de::parse_syml(input)?;
        let inner: Map<String, LockfileEntry> =
            serde_json::from_value(value).map_err(Error::SymlStructure)?;
        let key_to_entry = inner
            .keys()
            .flat_map(|key| {
                key.split(", ")
                    .map(move |descriptor| (descriptor.to_string(), key.clone()))
            })
            .collect();
        Ok(Self {
            inner,
            key_to_entry,
        })
    }
}

impl Lockfile for Yarn1Lockfile {
    fn resolve_package(
        &self,
        _workspace_path: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Package>, crate::Error> {
        let Some(key) = self.key_to_entry.get(&format!("{name}@{version}")) else {
            return Ok(None);
        };
        let entry = self
            .inner
            .get(key)
            .ok_or_else(|| crate::Error::MissingPackage(key.clone()))?;
        let version = entry
            .version
            .clone()
            .ok_or_else(|| crate::Error::MissingVersion(key.clone()))?;
        Ok(Some(Package {
            key: key.clone(),
            version,
        }))
    }

    fn all_dependencies(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<String, String>>, crate::Error> {
        Ok(self.inner.get(key).map(LockfileEntry::installed_dependencies))
    }

    fn entry(&self, key: &str) -> Option<&LockfileEntry> {
        self.inner.get(key)
    }

    fn encode_subset(&self, subset: &LockfileSubset) -> Result<Vec<u8>, crate::Error> {
        if subset.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_yaml::to_string(subset.entries())?.into_bytes())
    }
}
