use std::collections::BTreeMap;

use tracing::trace;

use crate::{Error, LockfileEntry};

/// The slice of a lockfile a single workspace is responsible for, keyed by
/// the dialect specific lockfile key.
pub type LockfileFragment = BTreeMap<String, LockfileEntry>;

/// A lockfile in the making: the union of the fragments of every workspace
/// that ends up in a pruned repository.
///
/// Keys are kept sorted so that the encoded lockfile only depends on the
/// set of merged fragments, not on the order they were merged in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LockfileSubset {
    entries: BTreeMap<String, LockfileEntry>,
    // which workspace first contributed each key, for error reporting
    owners: BTreeMap<String, String>,
}

impl LockfileSubset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `fragment` into the subset on behalf of `workspace`.
    ///
    /// A key that is already present must map to an identical record,
    /// otherwise the two workspaces disagree on how a package resolves and
    /// `Error::InconsistentLockfile` is returned.
    pub fn merge<'a>(
        &mut self,
        workspace: &str,
        fragment: impl IntoIterator<Item = (&'a String, &'a LockfileEntry)>,
    ) -> Result<(), Error> {
        for (key, entry) in fragment {
            self.insert(workspace, key, entry)?;
        }
        Ok(())
    }

    pub fn insert(&mut self, workspace: &str, key: &str, entry: &LockfileEntry) -> Result<(), Error> {
        match self.entries.get(key) {
            Some(existing) if existing == entry => Ok(()),
            Some(_) => Err(Error::InconsistentLockfile {
                key: key.to_string(),
                workspace: workspace.to_string(),
                existing_workspace: self.owners.get(key).cloned().unwrap_or_default(),
            }),
            None => {
                trace!("adding {key} for {workspace}");
                self.entries.insert(key.to_string(), entry.clone());
                self.owners.insert(key.to_string(), workspace.to_string());
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&LockfileEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> &BTreeMap<String, LockfileEntry> {
        &self.entries
    }
}
