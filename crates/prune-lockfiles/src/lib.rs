//! Package manager lockfile parsing, analysis, and serialization
//!
//! Parsing and analysis are used to work out which external packages each
//! workspace depends on. The records for those packages make up the
//! workspace's lockfile fragment, and the fragments of every workspace kept
//! by a prune are unioned into a `LockfileSubset` which is then encoded
//! back into the lockfile's own format.
//!
//! Serialization is far more error prone than deserialization and analysis
//! since package managers are picky about the exact textual form of their
//! lockfiles.

#![deny(clippy::all)]

mod berry;
mod entry;
mod error;
mod npm;
mod subset;
mod yarn1;

use std::{
    any::Any,
    collections::{HashMap, HashSet},
};

pub use berry::{BerryLockfile, BerryMetadata};
pub use entry::LockfileEntry;
pub use error::Error;
pub use npm::NpmLockfile;
use rayon::prelude::*;
use serde::Serialize;
pub use subset::{LockfileFragment, LockfileSubset};
pub use yarn1::Yarn1Lockfile;

#[derive(Debug, PartialEq, Eq, Clone, PartialOrd, Ord, Hash, Serialize)]
pub struct Package {
    pub key: String,
    pub version: String,
}

/// A trait for exposing common operations for lockfile parsing, analysis, and
/// encoding.
///
/// External packages are identified by key strings which have no shared
/// structure other than being able to uniquely identify a package in the
/// corresponding lockfile. When programming against these keys they should be
/// viewed as a black box and any logic for handling them should live in the
/// specific lockfile implementation.
pub trait Lockfile: Send + Sync + Any + std::fmt::Debug {
    /// Resolve a dependency declaration from a workspace package to a lockfile
    /// key
    fn resolve_package(
        &self,
        workspace_path: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Package>, Error>;

    /// Given a lockfile key return all (prod/dev/optional) direct dependencies
    /// of that package.
    fn all_dependencies(&self, key: &str) -> Result<Option<HashMap<String, String>>, Error>;

    /// The resolution record stored under `key`
    fn entry(&self, key: &str) -> Option<&LockfileEntry>;

    /// Packages that must accompany `key` in any lockfile containing it even
    /// though nothing declares a dependency on them, e.g. patched variants.
    fn companion_packages(&self, _key: &str) -> Vec<Package> {
        Vec::new()
    }

    /// Records that describe the workspace at `workspace_path` itself as
    /// opposed to one of its external dependencies.
    fn workspace_entries(&self, _workspace_path: &str) -> LockfileFragment {
        LockfileFragment::new()
    }

    /// Patch files, relative to the repository root, that installing the
    /// packages in `subset` reads
    fn patch_files(&self, _subset: &LockfileSubset) -> Vec<String> {
        Vec::new()
    }

    /// Encode `subset` in the generic structured form of this lockfile's
    /// format. Any textual fixups a package manager needs on top of that are
    /// applied by the caller.
    fn encode_subset(&self, subset: &LockfileSubset) -> Result<Vec<u8>, Error>;
}

/// Collects the records for `packages` into a fragment, together with the
/// records describing the workspace itself.
pub fn lockfile_fragment<L: Lockfile + ?Sized>(
    lockfile: &L,
    workspace_path: &str,
    packages: &HashSet<Package>,
) -> Result<LockfileFragment, Error> {
    let mut fragment = lockfile.workspace_entries(workspace_path);
    for package in packages {
        let entry = lockfile
            .entry(&package.key)
            .ok_or_else(|| Error::MissingPackage(package.key.clone()))?;
        fragment.insert(package.key.clone(), entry.clone());
    }
    Ok(fragment)
}

/// Takes a lockfile, and a map of workspace directory paths -> (package name,
/// version) and calculates the transitive closures for all of them
pub fn all_transitive_closures<L: Lockfile + ?Sized>(
    lockfile: &L,
    workspaces: HashMap<String, HashMap<String, String>>,
) -> Result<HashMap<String, HashSet<Package>>, Error> {
    workspaces
        .into_par_iter()
        .map(|(workspace, unresolved_deps)| {
            let closure = transitive_closure(lockfile, &workspace, unresolved_deps)?;
            Ok((workspace, closure))
        })
        .collect()
}

#[tracing::instrument(skip(lockfile, unresolved_deps))]
pub fn transitive_closure<L: Lockfile + ?Sized>(
    lockfile: &L,
    workspace_path: &str,
    unresolved_deps: HashMap<String, String>,
) -> Result<HashSet<Package>, Error> {
    let mut transitive_deps = HashSet::new();
    transitive_closure_helper(
        lockfile,
        workspace_path,
        unresolved_deps,
        &mut transitive_deps,
    )?;

    Ok(transitive_deps)
}

fn transitive_closure_helper<L: Lockfile + ?Sized>(
    lockfile: &L,
    workspace_path: &str,
    unresolved_deps: HashMap<String, impl AsRef<str>>,
    resolved_deps: &mut HashSet<Package>,
) -> Result<(), Error> {
    for (name, specifier) in unresolved_deps {
        let Some(pkg) = lockfile.resolve_package(workspace_path, &name, specifier.as_ref())? else {
            tracing::debug!(
                "{workspace_path}: no lockfile entry for {name}@{}",
                specifier.as_ref()
            );
            continue;
        };
        add_package(lockfile, workspace_path, pkg, resolved_deps)?;
    }

    Ok(())
}

fn add_package<L: Lockfile + ?Sized>(
    lockfile: &L,
    workspace_path: &str,
    pkg: Package,
    resolved_deps: &mut HashSet<Package>,
) -> Result<(), Error> {
    if resolved_deps.contains(&pkg) {
        return Ok(());
    }

    let all_deps = lockfile.all_dependencies(&pkg.key)?;
    let companions = lockfile.companion_packages(&pkg.key);
    resolved_deps.insert(pkg);
    for companion in companions {
        add_package(lockfile, workspace_path, companion, resolved_deps)?;
    }
    if let Some(deps) = all_deps {
        transitive_closure_helper(lockfile, workspace_path, deps, resolved_deps)?;
    }

    Ok(())
}

impl Package {
    pub fn new(key: impl Into<String>, version: impl Into<String>) -> Self {
        let key = key.into();
        let version = version.into();
        Self { key, version }
    }
}
