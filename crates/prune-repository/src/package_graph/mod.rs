use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};

use petgraph::{
    graph::NodeIndex,
    visit::{Dfs, Reversed},
};
use prune_lockfiles::{Lockfile, LockfileFragment};
use prunepath::{AbsoluteSystemPathBuf, AnchoredSystemPathBuf, PathError};
use serde::Serialize;

use crate::{
    discovery::LocalPackageDiscoveryBuilder, package_json::PackageJson,
    package_manager::PackageManager,
};

pub mod builder;
mod dep_splitter;

pub use builder::{Error, PackageGraphBuilder};

pub const ROOT_PKG_NAME: &str = "//";

/// The workspaces of a repository and the internal dependencies between
/// them.
///
/// Edges point from a workspace to the workspaces it depends on. The root
/// of the repository is a node of its own that has no edges.
#[derive(Debug)]
pub struct PackageGraph {
    graph: petgraph::Graph<WorkspaceName, ()>,
    node_lookup: HashMap<WorkspaceName, NodeIndex>,
    workspaces: HashMap<WorkspaceName, WorkspaceInfo>,
    package_manager: PackageManager,
    lockfile: Option<Box<dyn Lockfile>>,
    repo_root: AbsoluteSystemPathBuf,
}

/// WorkspaceInfo represents a single package within the repository.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkspaceInfo {
    pub package_json: PackageJson,
    pub package_json_path: AnchoredSystemPathBuf,
    pub internal_dependencies: BTreeSet<WorkspaceName>,
    /// name -> version range
    pub unresolved_external_dependencies: BTreeMap<String, String>,
    pub lockfile_fragment: LockfileFragment,
}

impl WorkspaceInfo {
    pub fn package_json_path(&self) -> &AnchoredSystemPathBuf {
        &self.package_json_path
    }

    /// The directory of this workspace relative to the repository root
    pub fn package_path(&self) -> AnchoredSystemPathBuf {
        self.package_json_path.parent().unwrap_or_default()
    }

    /// The directory of this workspace as the lockfiles refer to it, the
    /// root workspace is the empty string.
    pub fn unix_dir(&self) -> Result<String, PathError> {
        Ok(self.package_path().to_unix()?.as_str()?.to_string())
    }
}

// WorkspaceName refers to a real workspace's name or the root of the
// repository.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum WorkspaceName {
    Root,
    Other(String),
}

impl Serialize for WorkspaceName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WorkspaceName::Root => serializer.serialize_str(ROOT_PKG_NAME),
            WorkspaceName::Other(other) => serializer.serialize_str(other),
        }
    }
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceName::Root => f.write_str(ROOT_PKG_NAME),
            WorkspaceName::Other(other) => f.write_str(other),
        }
    }
}

impl From<String> for WorkspaceName {
    fn from(value: String) -> Self {
        WorkspaceName::Other(value)
    }
}

impl<'a> From<&'a str> for WorkspaceName {
    fn from(value: &'a str) -> Self {
        Self::from(value.to_string())
    }
}

impl PackageGraph {
    pub fn builder(
        repo_root: &AbsoluteSystemPathBuf,
        root_package_json: PackageJson,
    ) -> PackageGraphBuilder<LocalPackageDiscoveryBuilder> {
        PackageGraphBuilder::new(repo_root, root_package_json)
    }

    pub fn repo_root(&self) -> &AbsoluteSystemPathBuf {
        &self.repo_root
    }

    pub fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    /// The parsed lockfile, only present for package managers whose
    /// lockfiles can be read.
    pub fn lockfile(&self) -> Option<&dyn Lockfile> {
        self.lockfile.as_deref()
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    pub fn contains(&self, workspace: &WorkspaceName) -> bool {
        self.node_lookup.contains_key(workspace)
    }

    pub fn workspace_info(&self, workspace: &WorkspaceName) -> Option<&WorkspaceInfo> {
        self.workspaces.get(workspace)
    }

    fn node_index(&self, workspace: &WorkspaceName) -> Result<NodeIndex, Error> {
        self.node_lookup
            .get(workspace)
            .copied()
            .ok_or_else(|| Error::UnknownWorkspace(workspace.clone()))
    }

    /// The workspaces `workspace` directly depends on
    pub fn dependencies(&self, workspace: &WorkspaceName) -> Result<BTreeSet<&WorkspaceName>, Error> {
        let index = self.node_index(workspace)?;
        Ok(self
            .graph
            .neighbors_directed(index, petgraph::Outgoing)
            .map(|index| &self.graph[index])
            .collect())
    }

    /// Every workspace that `workspace` transitively depends on.
    ///
    /// Neither `workspace` itself nor the root are part of the result.
    ///
    /// Example:
    ///
    /// a -> b -> c
    ///
    /// ancestors(a) = {b, c}
    pub fn ancestors(&self, workspace: &WorkspaceName) -> Result<BTreeSet<WorkspaceName>, Error> {
        let start = self.node_index(workspace)?;
        let mut ancestors = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            ancestors.insert(self.graph[index].clone());
        }
        ancestors.remove(workspace);
        ancestors.remove(&WorkspaceName::Root);
        Ok(ancestors)
    }

    /// Every workspace that transitively depends on `workspace`.
    ///
    /// Example:
    ///
    /// a -> b -> c
    ///
    /// dependents(c) = {a, b}
    pub fn dependents(&self, workspace: &WorkspaceName) -> Result<BTreeSet<WorkspaceName>, Error> {
        let start = self.node_index(workspace)?;
        let reversed = Reversed(&self.graph);
        let mut dependents = BTreeSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(index) = dfs.next(reversed) {
            dependents.insert(self.graph[index].clone());
        }
        dependents.remove(workspace);
        Ok(dependents)
    }
}
