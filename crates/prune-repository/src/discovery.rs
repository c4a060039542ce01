//! Strategies for discovering the workspaces of a repository.
//!
//! Workspace discovery sits behind a trait so the package graph can be
//! built from an in-memory description of a repository as easily as from
//! the file system.

use std::collections::BTreeSet;

use prunepath::{AbsoluteSystemPathBuf, PathError};
use tracing::debug;

use crate::{
    package_json::PackageJson,
    package_manager::{self, PackageManager},
};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WorkspaceData {
    pub package_json: AbsoluteSystemPathBuf,
}

#[derive(Debug, Clone)]
pub struct DiscoveryResponse {
    pub workspaces: Vec<WorkspaceData>,
    pub package_manager: PackageManager,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    PackageManager(#[from] package_manager::Error),
    #[error("invalid workspace glob {glob}: {source}")]
    Glob {
        glob: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("unable to search for workspaces: {0}")]
    Walk(#[from] glob::GlobError),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Defines a strategy for discovering packages on the filesystem.
pub trait PackageDiscovery {
    fn discover_packages(&self) -> Result<DiscoveryResponse, Error>;
}

/// Allows for lazily creating the `PackageDiscovery` implementation, e.g.
/// only detecting the package manager once the graph is being built.
///
/// Note: there is a blanket implementation for everything that implements
/// PackageDiscovery
pub trait PackageDiscoveryBuilder {
    type Output: PackageDiscovery;
    type Error: std::error::Error;

    fn build(self) -> Result<Self::Output, Self::Error>;
}

impl<T: PackageDiscovery> PackageDiscoveryBuilder for T {
    type Output = T;
    type Error = std::convert::Infallible;

    fn build(self) -> Result<Self::Output, Self::Error> {
        Ok(self)
    }
}

/// Finds workspaces by expanding the package manager's workspace globs
pub struct LocalPackageDiscovery {
    repo_root: AbsoluteSystemPathBuf,
    package_manager: PackageManager,
}

impl LocalPackageDiscovery {
    pub fn new(repo_root: AbsoluteSystemPathBuf, package_manager: PackageManager) -> Self {
        Self {
            repo_root,
            package_manager,
        }
    }
}

impl PackageDiscovery for LocalPackageDiscovery {
    #[tracing::instrument(skip(self))]
    fn discover_packages(&self) -> Result<DiscoveryResponse, Error> {
        let globs = self.package_manager.get_workspace_globs(&self.repo_root)?;
        let root = glob::Pattern::escape(self.repo_root.to_str()?);

        let mut package_jsons = BTreeSet::new();
        for inclusion in &globs.raw_inclusions {
            let pattern = format!("{root}/{inclusion}/package.json");
            let paths = glob::glob(&pattern).map_err(|source| Error::Glob {
                glob: inclusion.clone(),
                source,
            })?;
            for path in paths {
                let package_json = AbsoluteSystemPathBuf::new(path?)?;
                let Some(dir) = package_json.parent() else {
                    continue;
                };
                // the root package.json is never a workspace of its own
                if dir == self.repo_root {
                    continue;
                }
                if globs.target_is_workspace(&self.repo_root, &dir)? {
                    package_jsons.insert(package_json);
                } else {
                    debug!("skipping {package_json}, it is excluded from the workspaces");
                }
            }
        }

        Ok(DiscoveryResponse {
            workspaces: package_jsons
                .into_iter()
                .map(|package_json| WorkspaceData { package_json })
                .collect(),
            package_manager: self.package_manager,
        })
    }
}

pub struct LocalPackageDiscoveryBuilder {
    repo_root: AbsoluteSystemPathBuf,
    package_manager: Option<PackageManager>,
    package_json: Option<PackageJson>,
}

impl LocalPackageDiscoveryBuilder {
    pub fn new(
        repo_root: AbsoluteSystemPathBuf,
        package_manager: Option<PackageManager>,
        package_json: Option<PackageJson>,
    ) -> Self {
        Self {
            repo_root,
            package_manager,
            package_json,
        }
    }
}

impl PackageDiscoveryBuilder for LocalPackageDiscoveryBuilder {
    type Output = LocalPackageDiscovery;
    type Error = package_manager::Error;

    fn build(self) -> Result<Self::Output, Self::Error> {
        let package_manager = match self.package_manager {
            Some(package_manager) => package_manager,
            None => PackageManager::get_package_manager(&self.repo_root, self.package_json.as_ref())?,
        };
        Ok(LocalPackageDiscovery::new(self.repo_root, package_manager))
    }
}
