use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    marker::PhantomData,
};

use miette::{Diagnostic, Report};
use petgraph::{
    algo::tarjan_scc,
    graph::{Graph, NodeIndex},
};
use prune_lockfiles::Lockfile;
use prunepath::{AbsoluteSystemPathBuf, AnchoredSystemPathBuf};
use tracing::{debug, warn};

use super::{dep_splitter::DependencySplitter, PackageGraph, WorkspaceInfo, WorkspaceName};
use crate::{
    discovery::{
        self, DiscoveryResponse, LocalPackageDiscoveryBuilder, PackageDiscovery,
        PackageDiscoveryBuilder, WorkspaceData,
    },
    package_json::PackageJson,
    package_manager::PackageManager,
};

pub struct PackageGraphBuilder<T> {
    repo_root: AbsoluteSystemPathBuf,
    root_package_json: PackageJson,
    package_jsons: Option<HashMap<AbsoluteSystemPathBuf, PackageJson>>,
    lockfile: Option<Box<dyn Lockfile>>,
    package_discovery: T,
}

#[derive(Debug, Diagnostic, thiserror::Error)]
pub enum Error {
    #[error("could not resolve workspaces")]
    #[diagnostic(transparent)]
    PackageManager(#[from] crate::package_manager::Error),
    #[error(transparent)]
    Discovery(#[from] discovery::Error),
    #[error(
        "Failed to add workspace \"{name}\" from \"{path}\", it already exists at \
         \"{existing_path}\""
    )]
    DuplicateWorkspace {
        name: String,
        path: String,
        existing_path: String,
    },
    #[error("Workspace \"{0}\" depends on itself")]
    SelfDependency(WorkspaceName),
    #[error("Invalid package dependency graph: cyclic dependency detected:\n\t{}", .0.join(" -> "))]
    CyclicDependencies(Vec<String>),
    #[error("Workspace \"{0}\" not found in the package graph")]
    UnknownWorkspace(WorkspaceName),
    #[error("path error: {0}")]
    Path(#[from] prunepath::PathError),
    #[diagnostic(transparent)]
    #[error(transparent)]
    PackageJson(#[from] crate::package_json::Error),
    #[error(transparent)]
    Lockfile(#[from] prune_lockfiles::Error),
}

impl PackageGraphBuilder<LocalPackageDiscoveryBuilder> {
    pub fn new(repo_root: &AbsoluteSystemPathBuf, root_package_json: PackageJson) -> Self {
        Self {
            package_discovery: LocalPackageDiscoveryBuilder::new(
                repo_root.clone(),
                None,
                Some(root_package_json.clone()),
            ),
            repo_root: repo_root.clone(),
            root_package_json,
            package_jsons: None,
            lockfile: None,
        }
    }
}

impl<P> PackageGraphBuilder<P> {
    /// Use already parsed package.json files instead of reading the ones
    /// that discovery finds
    pub fn with_package_jsons(
        mut self,
        package_jsons: Option<HashMap<AbsoluteSystemPathBuf, PackageJson>>,
    ) -> Self {
        self.package_jsons = package_jsons;
        self
    }

    pub fn with_lockfile(mut self, lockfile: Option<Box<dyn Lockfile>>) -> Self {
        self.lockfile = lockfile;
        self
    }

    /// Set the package discovery strategy to use.
    pub fn with_package_discovery<P2: PackageDiscoveryBuilder>(
        self,
        discovery: P2,
    ) -> PackageGraphBuilder<P2> {
        PackageGraphBuilder {
            repo_root: self.repo_root,
            root_package_json: self.root_package_json,
            package_jsons: self.package_jsons,
            lockfile: self.lockfile,
            package_discovery: discovery,
        }
    }
}

impl<T> PackageGraphBuilder<T>
where
    T: PackageDiscoveryBuilder,
    T::Error: Into<crate::package_manager::Error>,
{
    /// Build the `PackageGraph`.
    #[tracing::instrument(skip(self))]
    pub fn build(self) -> Result<PackageGraph, Error> {
        let state = BuildState::new(self)?;
        let state = state.parse_package_jsons()?;
        let state = state.resolve_lockfile()?;
        state.build_inner()
    }
}

struct BuildState<S> {
    repo_root: AbsoluteSystemPathBuf,
    package_manager: PackageManager,
    discovered: Vec<WorkspaceData>,
    workspaces: HashMap<WorkspaceName, WorkspaceInfo>,
    workspace_graph: Graph<WorkspaceName, ()>,
    node_lookup: HashMap<WorkspaceName, NodeIndex>,
    lockfile: Option<Box<dyn Lockfile>>,
    package_jsons: Option<HashMap<AbsoluteSystemPathBuf, PackageJson>>,
    state: PhantomData<S>,
}

// Allows us to perform workspace discovery and parse package jsons
enum ResolvedPackageManager {}

// Allows us to build the workspace graph and list over external dependencies
enum ResolvedWorkspaces {}

// Allows us to collect all transitive deps
enum ResolvedLockfile {}

impl<S> BuildState<S> {
    fn add_node(&mut self, node: WorkspaceName) -> NodeIndex {
        let idx = self.workspace_graph.add_node(node.clone());
        self.node_lookup.insert(node, idx);
        idx
    }

    fn node(&self, name: &WorkspaceName) -> Result<NodeIndex, Error> {
        self.node_lookup
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownWorkspace(name.clone()))
    }

    fn into_state<S2>(self) -> BuildState<S2> {
        let Self {
            repo_root,
            package_manager,
            discovered,
            workspaces,
            workspace_graph,
            node_lookup,
            lockfile,
            package_jsons,
            ..
        } = self;
        BuildState {
            repo_root,
            package_manager,
            discovered,
            workspaces,
            workspace_graph,
            node_lookup,
            lockfile,
            package_jsons,
            state: PhantomData,
        }
    }
}

impl BuildState<ResolvedPackageManager> {
    fn new<T>(builder: PackageGraphBuilder<T>) -> Result<Self, Error>
    where
        T: PackageDiscoveryBuilder,
        T::Error: Into<crate::package_manager::Error>,
    {
        let PackageGraphBuilder {
            repo_root,
            root_package_json,
            package_jsons,
            lockfile,
            package_discovery,
        } = builder;
        let package_discovery = package_discovery
            .build()
            .map_err(Into::<crate::package_manager::Error>::into)?;
        let DiscoveryResponse {
            workspaces: discovered,
            package_manager,
        } = package_discovery.discover_packages()?;

        let mut workspaces = HashMap::new();
        workspaces.insert(
            WorkspaceName::Root,
            WorkspaceInfo {
                package_json: root_package_json,
                package_json_path: AnchoredSystemPathBuf::from_raw("package.json")?,
                ..Default::default()
            },
        );

        Ok(BuildState {
            repo_root,
            package_manager,
            discovered,
            workspaces,
            lockfile,
            package_jsons,
            workspace_graph: Graph::new(),
            node_lookup: HashMap::new(),
            state: PhantomData,
        })
    }

    fn add_json(
        &mut self,
        package_json_path: AbsoluteSystemPathBuf,
        json: PackageJson,
    ) -> Result<(), Error> {
        let relative_json_path = self.repo_root.anchor(&package_json_path)?;
        let Some(name) = json.name.clone().filter(|name| !name.is_empty()) else {
            // workspaces without a name can't be depended on or targeted
            debug!("ignoring package.json at {package_json_path} since it has no name");
            return Ok(());
        };
        let name = WorkspaceName::Other(name);
        if let Some(existing) = self.workspaces.get(&name) {
            return Err(Error::DuplicateWorkspace {
                name: name.to_string(),
                path: relative_json_path.to_string(),
                existing_path: existing.package_json_path.to_string(),
            });
        }
        self.workspaces.insert(
            name.clone(),
            WorkspaceInfo {
                package_json: json,
                package_json_path: relative_json_path,
                ..Default::default()
            },
        );
        self.add_node(name);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn parse_package_jsons(mut self) -> Result<BuildState<ResolvedWorkspaces>, Error> {
        self.add_node(WorkspaceName::Root);

        let package_jsons = match self.package_jsons.take() {
            Some(jsons) => jsons,
            None => {
                let mut jsons = HashMap::new();
                for workspace in std::mem::take(&mut self.discovered) {
                    let json = PackageJson::load(&workspace.package_json)?;
                    jsons.insert(workspace.package_json, json);
                }
                jsons
            }
        };

        // sorted so the first of two duplicates is reported consistently
        let package_jsons = package_jsons.into_iter().collect::<BTreeMap<_, _>>();
        for (path, json) in package_jsons {
            self.add_json(path, json)?;
        }

        Ok(self.into_state())
    }
}

impl BuildState<ResolvedWorkspaces> {
    #[tracing::instrument(skip(self))]
    fn connect_internal_dependencies(&mut self) -> Result<(), Error> {
        let split_deps = self
            .workspaces
            .iter()
            .filter(|(name, _)| **name != WorkspaceName::Root)
            .map(|(name, entry)| {
                let workspace_dir = self.repo_root.resolve(&entry.package_path());
                let splitter =
                    DependencySplitter::new(&self.repo_root, &workspace_dir, &self.workspaces);
                let mut internal = BTreeSet::new();
                let mut external = BTreeMap::new();
                for (dep_name, version) in entry.package_json.all_dependencies() {
                    match splitter.is_internal(dep_name, version) {
                        Some(workspace) => {
                            internal.insert(workspace);
                        }
                        None => {
                            external.insert(dep_name.clone(), version.clone());
                        }
                    }
                }
                (name.clone(), internal, external)
            })
            .collect::<Vec<_>>();

        for (name, internal, external) in split_deps {
            if internal.contains(&name) {
                return Err(Error::SelfDependency(name));
            }
            let node_idx = self.node(&name)?;
            for dependency in &internal {
                let dependency_idx = self.node(dependency)?;
                self.workspace_graph.add_edge(node_idx, dependency_idx, ());
            }
            if let Some(entry) = self.workspaces.get_mut(&name) {
                entry.internal_dependencies = internal;
                entry.unresolved_external_dependencies = external;
            }
        }

        Ok(())
    }

    // Any strongly connected component with more than one workspace is a
    // cycle, self edges are rejected while connecting dependencies.
    fn validate(&self) -> Result<(), Error> {
        for component in tarjan_scc(&self.workspace_graph) {
            if component.len() > 1 {
                let mut cycle = component
                    .iter()
                    .map(|idx| self.workspace_graph[*idx].to_string())
                    .collect::<Vec<_>>();
                cycle.sort();
                return Err(Error::CyclicDependencies(cycle));
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn populate_lockfile(&mut self) -> Result<Option<Box<dyn Lockfile>>, Error> {
        if let Some(lockfile) = self.lockfile.take() {
            return Ok(Some(lockfile));
        }
        if !self.package_manager.can_prune() {
            debug!("{} lockfiles are not read", self.package_manager);
            return Ok(None);
        }
        Ok(Some(self.package_manager.read_lockfile(&self.repo_root)?))
    }

    #[tracing::instrument(skip(self))]
    fn resolve_lockfile(mut self) -> Result<BuildState<ResolvedLockfile>, Error> {
        self.connect_internal_dependencies()?;
        self.validate()?;

        self.lockfile = match self.populate_lockfile() {
            Ok(lockfile) => lockfile,
            Err(e) => {
                warn!(
                    "Issues occurred when reading the lockfile, dependencies on external \
                     packages are unknown:\n {:?}",
                    Report::new(e)
                );
                None
            }
        };

        Ok(self.into_state())
    }
}

impl BuildState<ResolvedLockfile> {
    fn all_external_dependencies(&self) -> Result<HashMap<String, HashMap<String, String>>, Error> {
        self.workspaces
            .iter()
            .filter(|(name, _)| **name != WorkspaceName::Root)
            .map(|(_, entry)| {
                let external_deps = entry
                    .unresolved_external_dependencies
                    .iter()
                    .map(|(name, version)| (name.clone(), version.clone()))
                    .collect();
                Ok((entry.unix_dir()?, external_deps))
            })
            .collect()
    }

    #[tracing::instrument(skip_all)]
    fn populate_lockfile_fragments(&mut self) -> Result<(), Error> {
        let Some(lockfile) = self.lockfile.as_deref() else {
            return Ok(());
        };

        // We cannot ignore missing packages in this context, it would indicate a
        // malformed or stale lockfile.
        let mut closures =
            prune_lockfiles::all_transitive_closures(lockfile, self.all_external_dependencies()?)?;
        for (name, entry) in self.workspaces.iter_mut() {
            if *name == WorkspaceName::Root {
                continue;
            }
            let workspace_path = entry.unix_dir()?;
            let closure = closures.remove(&workspace_path).unwrap_or_default();
            entry.lockfile_fragment =
                prune_lockfiles::lockfile_fragment(lockfile, &workspace_path, &closure)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn build_inner(mut self) -> Result<PackageGraph, Error> {
        self.populate_lockfile_fragments()?;
        let Self {
            repo_root,
            package_manager,
            workspaces,
            workspace_graph,
            node_lookup,
            lockfile,
            ..
        } = self;
        Ok(PackageGraph {
            graph: workspace_graph,
            node_lookup,
            workspaces,
            package_manager,
            lockfile,
            repo_root,
        })
    }
}
