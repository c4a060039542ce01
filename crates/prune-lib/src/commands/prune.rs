use std::{collections::BTreeSet, fmt};

use miette::Diagnostic;
use prune_fs::Action;
use prune_lockfiles::{Lockfile, LockfileSubset};
use prune_repository::{
    package_graph::{self, PackageGraph, WorkspaceInfo, WorkspaceName},
    package_json::{self, PackageJson},
    package_manager::{self, PackageManager},
};
use prunepath::{AbsoluteSystemPathBuf, RelativeUnixPathBuf};
use thiserror::Error;
use tracing::{debug, trace};

use super::CommandBase;
use crate::ui::{UI, BOLD};

// Files copied from the repository root into the full tree when they exist
const PASSTHROUGH_FILES: &[&str] = &[".gitignore", "turbo.json", ".npmrc", ".yarnrc.yml"];

const ROOT_PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("at least one target must be specified")]
    NoScope,
    #[error("prune is not supported for {0} repositories")]
    #[diagnostic(help("prune supports npm, yarn and berry repositories"))]
    UnsupportedPackageManager(PackageManager),
    #[error("cannot prune without a parsed {0}")]
    MissingLockfile(&'static str),
    #[error(
        "output directory {out_dir} is inside workspace {workspace} and would be copied into \
         itself"
    )]
    OutputInsideWorkspace {
        out_dir: AbsoluteSystemPathBuf,
        workspace: WorkspaceName,
    },
    #[error("output directory {0} would overwrite the repository being pruned")]
    #[diagnostic(help("choose an output directory other than the repository root"))]
    OutputOverwritesRepository(AbsoluteSystemPathBuf),
    #[error("unable to read root package.json: {0}")]
    PackageJson(#[from] package_json::Error),
    #[error(transparent)]
    #[diagnostic(transparent)]
    PackageManager(package_manager::Error),
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(code(prune::config))]
    Config(#[from] ConfigError),
    #[error("invalid scope: workspace {0} not found")]
    #[diagnostic(code(prune::unknown_workspace))]
    UnknownWorkspace(WorkspaceName),
    #[error(transparent)]
    #[diagnostic(code(prune::inconsistent_lockfile))]
    InconsistentLockfile(prune_lockfiles::Error),
    #[error("unable to prune lockfile: {0}")]
    #[diagnostic(code(prune::lockfile))]
    Lockfile(prune_lockfiles::Error),
    #[error(transparent)]
    #[diagnostic(code(prune::io))]
    Io(#[from] prune_fs::Error),
    #[error(transparent)]
    #[diagnostic(code(prune::graph))]
    Graph(package_graph::Error),
}

impl From<prune_lockfiles::Error> for Error {
    fn from(err: prune_lockfiles::Error) -> Self {
        match err {
            err @ prune_lockfiles::Error::InconsistentLockfile { .. } => {
                Error::InconsistentLockfile(err)
            }
            err => Error::Lockfile(err),
        }
    }
}

impl From<package_manager::Error> for Error {
    fn from(err: package_manager::Error) -> Self {
        match err {
            package_manager::Error::Lockfile(err) => err.into(),
            err => ConfigError::PackageManager(err).into(),
        }
    }
}

impl From<package_graph::Error> for Error {
    fn from(err: package_graph::Error) -> Self {
        match err {
            package_graph::Error::UnknownWorkspace(workspace) => Error::UnknownWorkspace(workspace),
            package_graph::Error::PackageManager(err) => err.into(),
            package_graph::Error::PackageJson(err) => ConfigError::PackageJson(err).into(),
            package_graph::Error::Lockfile(err) => err.into(),
            err => Error::Graph(err),
        }
    }
}

/// What to prune and where to put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneRequest {
    /// Workspaces that must be buildable in the pruned repository
    pub scope: Vec<String>,
    /// Lay the output out as `json/` and `full/` trees
    pub docker: bool,
    /// Output directory, relative paths are resolved against the repository
    /// root
    pub output_dir: String,
}

fn check_scope(scope: &[String]) -> Result<(), ConfigError> {
    if scope.is_empty() || scope.iter().any(|target| target.is_empty()) {
        return Err(ConfigError::NoScope);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneState {
    Created,
    Validating,
    ResolvingClosure,
    StagingFiles,
    SubsettingLockfile,
    Finalized,
    Aborted,
}

impl fmt::Display for PruneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PruneState::Created => "created",
            PruneState::Validating => "validating",
            PruneState::ResolvingClosure => "resolving closure",
            PruneState::StagingFiles => "staging files",
            PruneState::SubsettingLockfile => "subsetting lockfile",
            PruneState::Finalized => "finalized",
            PruneState::Aborted => "aborted",
        })
    }
}

/// Reads the repository at `base.repo_root` and prunes it as described by
/// `request`. Returns the workspaces that were kept.
pub fn prune(base: &CommandBase, request: PruneRequest) -> Result<BTreeSet<WorkspaceName>, Error> {
    check_scope(&request.scope)?;

    let root_package_json = PackageJson::load(&base.root_package_json_path())
        .map_err(ConfigError::PackageJson)?;
    let package_graph = PackageGraph::builder(&base.repo_root, root_package_json).build()?;

    let mut pruner = Pruner::new(&package_graph, request, base.ui);
    pruner.prune()
}

/// Copies the closure of the requested workspaces out of a repository
/// together with a lockfile that only contains what they need.
///
/// Failures leave whatever was already written in the output directory
/// untouched.
pub struct Pruner<'a> {
    package_graph: &'a PackageGraph,
    ui: UI,
    root: AbsoluteSystemPathBuf,
    scope: Vec<String>,
    docker: bool,
    out_directory: AbsoluteSystemPathBuf,
    full_directory: AbsoluteSystemPathBuf,
    state: PruneState,
}

impl<'a> Pruner<'a> {
    pub fn new(package_graph: &'a PackageGraph, request: PruneRequest, ui: UI) -> Self {
        let root = package_graph.repo_root().clone();
        let out_directory =
            AbsoluteSystemPathBuf::from_unknown(&root, &request.output_dir).clean();
        let full_directory = match request.docker {
            true => out_directory.join_component("full"),
            false => out_directory.clone(),
        };

        Self {
            package_graph,
            ui,
            root,
            scope: request.scope,
            docker: request.docker,
            out_directory,
            full_directory,
            state: PruneState::Created,
        }
    }

    pub fn state(&self) -> PruneState {
        self.state
    }

    pub fn out_directory(&self) -> &AbsoluteSystemPathBuf {
        &self.out_directory
    }

    fn docker_directory(&self) -> AbsoluteSystemPathBuf {
        self.out_directory.join_component("json")
    }

    fn transition(&mut self, next: PruneState) {
        debug!("prune: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Runs every stage in order, the first failure moves the pruner to
    /// `PruneState::Aborted`.
    pub fn prune(&mut self) -> Result<BTreeSet<WorkspaceName>, Error> {
        let result = self.run_stages();
        if let Err(err) = &result {
            debug!("prune aborted in state {}: {}", self.state, err);
            self.transition(PruneState::Aborted);
        }
        result
    }

    fn run_stages(&mut self) -> Result<BTreeSet<WorkspaceName>, Error> {
        self.transition(PruneState::Validating);
        let lockfile = self.validate()?;

        self.transition(PruneState::ResolvingClosure);
        let closure = self.resolve_closure()?;

        self.transition(PruneState::StagingFiles);
        self.stage_files(&closure)?;

        self.transition(PruneState::SubsettingLockfile);
        self.write_lockfile(lockfile, &closure)?;

        self.transition(PruneState::Finalized);
        for workspace in &closure {
            println!(" - Added {workspace}");
        }

        Ok(closure)
    }

    fn validate(&self) -> Result<&'a dyn Lockfile, Error> {
        let package_graph: &'a PackageGraph = self.package_graph;
        check_scope(&self.scope)?;

        let package_manager = package_graph.package_manager();
        if !package_manager.can_prune() {
            return Err(ConfigError::UnsupportedPackageManager(package_manager).into());
        }

        trace!("scope: {}", self.scope.join(", "));
        trace!("docker: {}", self.docker);
        trace!("out directory: {}", self.out_directory);

        for target in &self.scope {
            let workspace = WorkspaceName::from(target.as_str());
            let info = self.workspace_info(&workspace)?;
            trace!("target: {}", workspace);
            trace!("workspace directory: {}", info.package_path());
            trace!("internal dependencies: {:?}", info.internal_dependencies);
            trace!(
                "external dependencies: {:?}",
                info.unresolved_external_dependencies
            );
        }

        package_graph
            .lockfile()
            .ok_or_else(|| ConfigError::MissingLockfile(package_manager.lockfile_name()).into())
    }

    fn resolve_closure(&self) -> Result<BTreeSet<WorkspaceName>, Error> {
        let mut closure = BTreeSet::new();
        for target in &self.scope {
            let workspace = WorkspaceName::from(target.as_str());
            closure.extend(self.package_graph.ancestors(&workspace)?);
            closure.insert(workspace);
        }
        closure.remove(&WorkspaceName::Root);
        trace!("closure: {:?}", closure);

        self.check_output_directory(&closure)?;
        Ok(closure)
    }

    // Copies land at the same relative paths they were read from, so a tree
    // rooted at the repository itself would truncate every source file and
    // the pruned lockfile would replace the original.
    fn check_output_directory(&self, closure: &BTreeSet<WorkspaceName>) -> Result<(), Error> {
        let overwrites_root = self.out_directory == self.root
            || self.full_directory == self.root
            || (self.docker && self.docker_directory() == self.root);
        if overwrites_root {
            return Err(ConfigError::OutputOverwritesRepository(self.out_directory.clone()).into());
        }

        for workspace in closure {
            let info = self.workspace_info(workspace)?;
            let workspace_dir = self.root.resolve(&info.package_path());
            if self.out_directory.starts_with(&workspace_dir) {
                return Err(ConfigError::OutputInsideWorkspace {
                    out_dir: self.out_directory.clone(),
                    workspace: workspace.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    fn stage_files(&self, closure: &BTreeSet<WorkspaceName>) -> Result<(), Error> {
        println!(
            "Generating pruned monorepo for {} in {}",
            self.ui.apply(BOLD.apply_to(self.scope.join(", "))),
            self.ui.apply(BOLD.apply_to(&self.out_directory)),
        );

        self.out_directory
            .create_dir_all()
            .map_err(|source| prune_fs::Error::Io {
                action: Action::CreateDir,
                path: self.out_directory.clone(),
                source,
            })?;

        let mut new_workspaces = Vec::with_capacity(closure.len());
        for workspace in closure {
            let info = self.workspace_info(workspace)?;
            self.copy_workspace(info)?;
            new_workspaces.push(info.package_path().to_string());
        }
        trace!("new workspaces: {}", new_workspaces.join(", "));

        for file in PASSTHROUGH_FILES {
            self.copy_optional_root_file(file)?;
        }
        self.copy_root_package_json()
    }

    fn copy_workspace(&self, info: &WorkspaceInfo) -> Result<(), Error> {
        let package_path = info.package_path();
        let original_dir = self.root.resolve(&package_path);
        let target_dir = self.full_directory.resolve(&package_path);
        trace!("copying {} to {}", original_dir, target_dir);
        prune_fs::recursive_copy(&original_dir, &target_dir)?;

        if self.docker {
            let package_json_path = info.package_json_path();
            prune_fs::copy_file(
                &self.root.resolve(package_json_path),
                &self.docker_directory().resolve(package_json_path),
            )?;
        }

        Ok(())
    }

    fn copy_optional_root_file(&self, name: &str) -> Result<(), Error> {
        let from = self.root.join_component(name);
        if !from.exists() {
            trace!("{} not found, skipping", name);
            return Ok(());
        }
        prune_fs::copy_file(&from, &self.full_directory.join_component(name))?;
        Ok(())
    }

    fn copy_root_package_json(&self) -> Result<(), Error> {
        let from = self.root.join_component(ROOT_PACKAGE_JSON);
        prune_fs::copy_file(&from, &self.full_directory.join_component(ROOT_PACKAGE_JSON))?;
        if self.docker {
            prune_fs::copy_file(
                &from,
                &self.docker_directory().join_component(ROOT_PACKAGE_JSON),
            )?;
        }
        Ok(())
    }

    fn write_lockfile(
        &self,
        lockfile: &dyn Lockfile,
        closure: &BTreeSet<WorkspaceName>,
    ) -> Result<(), Error> {
        // The closure is sorted, so fragments are always merged in the same
        // order
        let mut subset = LockfileSubset::new();
        for workspace in closure {
            let info = self.workspace_info(workspace)?;
            subset.merge(&workspace.to_string(), &info.lockfile_fragment)?;
        }
        trace!("lockfile subset has {} entries", subset.len());

        let package_manager = self.package_graph.package_manager();
        let contents = package_manager.encode_lockfile(lockfile, &subset)?;
        let lockfile_path = self
            .out_directory
            .join_component(package_manager.lockfile_name());
        trace!("writing lockfile to {}", lockfile_path);
        prune_fs::write_atomic(&lockfile_path, &contents)?;

        // installs of patched packages read their patch files from the
        // repository
        for patch in lockfile.patch_files(&subset) {
            let patch = RelativeUnixPathBuf::new(patch.as_str())
                .and_then(|patch| patch.to_system_path())
                .map_err(prune_fs::Error::from)?;
            trace!("copying patch {}", patch);
            prune_fs::copy_file(
                &self.root.resolve(&patch),
                &self.full_directory.resolve(&patch),
            )?;
        }

        Ok(())
    }

    fn workspace_info(&self, workspace: &WorkspaceName) -> Result<&'a WorkspaceInfo, Error> {
        let package_graph: &'a PackageGraph = self.package_graph;
        package_graph
            .workspace_info(workspace)
            .ok_or_else(|| Error::UnknownWorkspace(workspace.clone()))
    }
}

#[cfg(test)]
mod test {
    use std::collections::{BTreeMap, HashMap};

    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use prune_lockfiles::{BerryLockfile, LockfileEntry, LockfileFragment, Package, Yarn1Lockfile};
    use serde_json::json;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    use super::*;

    struct Repo {
        _tmp: TempDir,
        root: AbsoluteSystemPathBuf,
    }

    impl Repo {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = AbsoluteSystemPathBuf::new(tmp.path()).unwrap();
            Self { _tmp: tmp, root }
        }

        fn path(&self, unix_path: &str) -> AbsoluteSystemPathBuf {
            self.root
                .join_components(&unix_path.split('/').collect::<Vec<_>>())
        }

        fn write(&self, unix_path: &str, contents: impl AsRef<[u8]>) {
            let path = self.path(unix_path);
            path.ensure_dir().unwrap();
            path.create_with_contents(contents).unwrap();
        }

        fn write_json(&self, unix_path: &str, value: serde_json::Value) {
            self.write(unix_path, serde_json::to_string_pretty(&value).unwrap());
        }

        fn graph(&self) -> PackageGraph {
            self.graph_with_lockfile(None)
        }

        fn graph_with_lockfile(&self, lockfile: Option<Box<dyn Lockfile>>) -> PackageGraph {
            let root_package_json = PackageJson::load(&self.path("package.json")).unwrap();
            PackageGraph::builder(&self.root, root_package_json)
                .with_lockfile(lockfile)
                .build()
                .unwrap()
        }

        // Relative paths of every file below `unix_path`
        fn files(&self, unix_path: &str) -> BTreeSet<String> {
            let dir = self.path(unix_path);
            WalkDir::new(dir.as_path())
                .into_iter()
                .map(|entry| entry.unwrap())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| {
                    entry
                        .path()
                        .strip_prefix(dir.as_path())
                        .unwrap()
                        .components()
                        .map(|c| c.as_os_str().to_str().unwrap())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .collect()
        }
    }

    fn request(scope: &[&str], docker: bool, output_dir: &str) -> PruneRequest {
        PruneRequest {
            scope: scope.iter().map(|s| s.to_string()).collect(),
            docker,
            output_dir: output_dir.to_string(),
        }
    }

    fn ui() -> UI {
        UI::new(true)
    }

    // web depends on ui and utils, other is unrelated
    fn npm_repo() -> Repo {
        let repo = Repo::new();
        repo.write_json(
            "package.json",
            json!({ "name": "monorepo", "workspaces": ["apps/*", "packages/*"] }),
        );
        repo.write(".gitignore", "node_modules\n");
        repo.write_json("turbo.json", json!({ "pipeline": {} }));
        repo.write_json(
            "apps/web/package.json",
            json!({
                "name": "web",
                "version": "1.0.0",
                "dependencies": { "lodash": "^4.17.21", "ui": "*", "utils": "*" }
            }),
        );
        repo.write("apps/web/src/index.js", "export default 'web';\n");
        repo.write_json(
            "packages/ui/package.json",
            json!({
                "name": "ui",
                "version": "1.0.0",
                "dependencies": { "react": "^18.2.0" }
            }),
        );
        repo.write("packages/ui/index.js", "export const Button = null;\n");
        repo.write_json(
            "packages/utils/package.json",
            json!({ "name": "utils", "version": "1.0.0" }),
        );
        repo.write_json(
            "packages/other/package.json",
            json!({
                "name": "other",
                "version": "1.0.0",
                "dependencies": { "left-pad": "^1.3.0" }
            }),
        );
        repo.write_json(
            "package-lock.json",
            json!({
                "name": "monorepo",
                "lockfileVersion": 3,
                "requires": true,
                "packages": {
                    "": { "name": "monorepo", "workspaces": ["apps/*", "packages/*"] },
                    "apps/web": {
                        "name": "web",
                        "version": "1.0.0",
                        "dependencies": { "lodash": "^4.17.21", "ui": "*", "utils": "*" }
                    },
                    "packages/ui": {
                        "name": "ui",
                        "version": "1.0.0",
                        "dependencies": { "react": "^18.2.0" }
                    },
                    "packages/utils": { "name": "utils", "version": "1.0.0" },
                    "packages/other": {
                        "name": "other",
                        "version": "1.0.0",
                        "dependencies": { "left-pad": "^1.3.0" }
                    },
                    "node_modules/web": { "resolved": "apps/web", "link": true },
                    "node_modules/ui": { "resolved": "packages/ui", "link": true },
                    "node_modules/utils": { "resolved": "packages/utils", "link": true },
                    "node_modules/other": { "resolved": "packages/other", "link": true },
                    "node_modules/lodash": {
                        "version": "4.17.21",
                        "resolved": "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz",
                        "integrity": "sha512-lodash"
                    },
                    "node_modules/react": {
                        "version": "18.2.0",
                        "resolved": "https://registry.npmjs.org/react/-/react-18.2.0.tgz",
                        "integrity": "sha512-react",
                        "dependencies": { "loose-envify": "^1.1.0" }
                    },
                    "node_modules/loose-envify": {
                        "version": "1.4.0",
                        "resolved": "https://registry.npmjs.org/loose-envify/-/loose-envify-1.4.0.tgz",
                        "integrity": "sha512-le"
                    },
                    "node_modules/left-pad": {
                        "version": "1.3.0",
                        "resolved": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
                        "integrity": "sha512-lp"
                    }
                }
            }),
        );
        repo
    }

    fn lockfile_packages(repo: &Repo, unix_path: &str) -> BTreeSet<String> {
        let contents = repo.path(unix_path).read_to_string().unwrap();
        let lockfile: serde_json::Value = serde_json::from_str(&contents).unwrap();
        lockfile["packages"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect()
    }

    fn names(names: &[&str]) -> BTreeSet<WorkspaceName> {
        names.iter().map(|name| WorkspaceName::from(*name)).collect()
    }

    #[test]
    fn test_prune_keeps_dependency_closure() {
        let repo = npm_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["web"], false, "out"), ui());

        let closure = pruner.prune().unwrap();

        assert_eq!(closure, names(&["ui", "utils", "web"]));
        assert_eq!(pruner.state(), PruneState::Finalized);
        assert_eq!(
            repo.files("out"),
            [
                ".gitignore",
                "apps/web/package.json",
                "apps/web/src/index.js",
                "package-lock.json",
                "package.json",
                "packages/ui/index.js",
                "packages/ui/package.json",
                "packages/utils/package.json",
                "turbo.json",
            ]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>()
        );
        assert_eq!(
            lockfile_packages(&repo, "out/package-lock.json"),
            [
                "",
                "apps/web",
                "node_modules/lodash",
                "node_modules/loose-envify",
                "node_modules/react",
                "node_modules/ui",
                "node_modules/utils",
                "node_modules/web",
                "packages/ui",
                "packages/utils",
            ]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_prune_leaf_workspace() {
        let repo = npm_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["utils"], false, "out"), ui());

        assert_eq!(pruner.prune().unwrap(), names(&["utils"]));
        assert_eq!(
            lockfile_packages(&repo, "out/package-lock.json"),
            ["", "node_modules/utils", "packages/utils"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_prune_multiple_targets() {
        let repo = npm_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["ui", "other"], false, "out"), ui());

        assert_eq!(pruner.prune().unwrap(), names(&["other", "ui"]));
        let packages = lockfile_packages(&repo, "out/package-lock.json");
        assert!(packages.contains("node_modules/left-pad"));
        assert!(packages.contains("node_modules/react"));
        assert!(!packages.contains("node_modules/lodash"));
    }

    #[test]
    fn test_docker_layout() {
        let repo = npm_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["web"], true, "out"), ui());

        pruner.prune().unwrap();

        assert_eq!(
            repo.files("out/json"),
            [
                "apps/web/package.json",
                "package.json",
                "packages/ui/package.json",
                "packages/utils/package.json",
            ]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>()
        );
        let full = repo.files("out/full");
        for file in [
            ".gitignore",
            "turbo.json",
            "package.json",
            "apps/web/src/index.js",
            "packages/ui/index.js",
        ] {
            assert!(full.contains(file), "{file} missing from full tree");
        }
        assert!(!full.contains("package-lock.json"));
        assert!(repo.path("out/package-lock.json").exists());
    }

    #[test]
    fn test_unknown_workspace_writes_nothing() {
        let repo = npm_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["missing"], false, "out"), ui());

        let err = pruner.prune().unwrap_err();

        assert!(
            matches!(&err, Error::UnknownWorkspace(WorkspaceName::Other(name)) if name == "missing")
        );
        assert_eq!(pruner.state(), PruneState::Aborted);
        assert!(!repo.path("out").exists());
    }

    #[test]
    fn test_empty_scope() {
        let repo = npm_repo();
        let graph = repo.graph();
        for scope in [&[][..], &[""][..]] {
            let mut pruner = Pruner::new(&graph, request(scope, false, "out"), ui());
            let err = pruner.prune().unwrap_err();
            assert!(matches!(err, Error::Config(ConfigError::NoScope)));
            assert_eq!(err.to_string(), "at least one target must be specified");
        }
        assert!(!repo.path("out").exists());
    }

    #[test]
    fn test_pnpm_is_unsupported() {
        let repo = Repo::new();
        repo.write_json("package.json", json!({ "name": "monorepo" }));
        repo.write("pnpm-workspace.yaml", "packages:\n  - \"packages/*\"\n");
        repo.write("pnpm-lock.yaml", "lockfileVersion: '6.0'\n");
        repo.write_json(
            "packages/a/package.json",
            json!({ "name": "a", "version": "1.0.0" }),
        );
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["a"], false, "out"), ui());

        let err = pruner.prune().unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::UnsupportedPackageManager(PackageManager::Pnpm))
        ));
        assert!(err.to_string().contains("not supported"));
        assert!(!repo.path("out").exists());
    }

    #[test]
    fn test_missing_lockfile_is_config_error() {
        let repo = npm_repo();
        // an unreadable lockfile is only warned about while building the graph
        repo.write("package-lock.json", "{ not json");
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["web"], false, "out"), ui());

        let err = pruner.prune().unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingLockfile("package-lock.json"))
        ));
        assert!(!repo.path("out").exists());
    }

    #[test]
    fn test_output_inside_workspace() {
        let repo = npm_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["web"], false, "apps/web/out"), ui());

        let err = pruner.prune().unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::OutputInsideWorkspace { ref workspace, .. })
                if *workspace == WorkspaceName::from("web")
        ));
        assert!(!repo.path("apps/web/out").exists());
    }

    #[test]
    fn test_output_at_repository_root_is_refused() {
        let repo = npm_repo();
        let graph = repo.graph();
        let lockfile = repo.path("package-lock.json").read().unwrap();

        for (output_dir, docker) in [(".", false), ("", false), ("apps/..", false), (".", true)] {
            let mut pruner = Pruner::new(&graph, request(&["web"], docker, output_dir), ui());
            let err = pruner.prune().unwrap_err();
            assert!(
                matches!(err, Error::Config(ConfigError::OutputOverwritesRepository(_))),
                "{output_dir:?} was not refused: {err}"
            );
            assert_eq!(pruner.state(), PruneState::Aborted);
        }

        assert_eq!(
            repo.path("apps/web/src/index.js").read_to_string().unwrap(),
            "export default 'web';\n"
        );
        assert!(repo
            .path("package.json")
            .read_to_string()
            .unwrap()
            .contains("monorepo"));
        assert_eq!(repo.path("package-lock.json").read().unwrap(), lockfile);
        assert!(!repo.path("full").exists());
        assert!(!repo.path("json").exists());
    }

    #[test]
    fn test_lockfile_is_reproducible() {
        let repo = npm_repo();
        let graph = repo.graph();
        for out in ["out-a", "out-b"] {
            Pruner::new(&graph, request(&["web"], false, out), ui())
                .prune()
                .unwrap();
        }
        // pruning again over existing output is fine
        Pruner::new(&graph, request(&["web"], false, "out-a"), ui())
            .prune()
            .unwrap();

        assert_eq!(
            repo.path("out-a/package-lock.json").read().unwrap(),
            repo.path("out-b/package-lock.json").read().unwrap()
        );
    }

    // Hands every workspace a record for the same key, with a version that
    // depends on the workspace
    #[derive(Debug)]
    struct ConflictingLockfile;

    impl Lockfile for ConflictingLockfile {
        fn resolve_package(
            &self,
            _workspace_path: &str,
            _name: &str,
            _version: &str,
        ) -> Result<Option<Package>, prune_lockfiles::Error> {
            Ok(None)
        }

        fn all_dependencies(
            &self,
            _key: &str,
        ) -> Result<Option<HashMap<String, String>>, prune_lockfiles::Error> {
            Ok(None)
        }

        fn entry(&self, _key: &str) -> Option<&LockfileEntry> {
            None
        }

        fn workspace_entries(&self, workspace_path: &str) -> LockfileFragment {
            let version = match workspace_path {
                "apps/web" => "4.0.0",
                _ => "4.1.0",
            };
            BTreeMap::from([(
                "lodash@^4.0.0".to_string(),
                LockfileEntry {
                    version: Some(version.to_string()),
                    ..Default::default()
                },
            )])
        }

        fn encode_subset(&self, subset: &LockfileSubset) -> Result<Vec<u8>, prune_lockfiles::Error> {
            Ok(serde_json::to_vec(subset.entries())?)
        }
    }

    #[test]
    fn test_inconsistent_lockfile_aborts_before_write() {
        let repo = npm_repo();
        let graph = repo.graph_with_lockfile(Some(Box::new(ConflictingLockfile)));
        let mut pruner = Pruner::new(&graph, request(&["web"], false, "out"), ui());

        let err = pruner.prune().unwrap_err();

        match &err {
            Error::InconsistentLockfile(prune_lockfiles::Error::InconsistentLockfile {
                key,
                workspace,
                existing_workspace,
            }) => {
                assert_eq!(key, "lodash@^4.0.0");
                assert_eq!(existing_workspace, "ui");
                assert_eq!(workspace, "web");
            }
            other => panic!("expected an inconsistent lockfile, got {other:?}"),
        }
        assert_eq!(pruner.state(), PruneState::Aborted);
        assert!(!repo.path("out/package-lock.json").exists());
    }

    #[test]
    fn test_prune_yarn_classic() {
        let repo = Repo::new();
        repo.write_json(
            "package.json",
            json!({ "name": "monorepo", "private": true, "workspaces": ["packages/*"] }),
        );
        repo.write_json(
            "packages/app/package.json",
            json!({
                "name": "app",
                "version": "1.0.0",
                "dependencies": { "lib": "^1.0.0", "react": "^18.2.0" }
            }),
        );
        repo.write_json(
            "packages/lib/package.json",
            json!({ "name": "lib", "version": "1.0.0" }),
        );
        repo.write_json(
            "packages/tool/package.json",
            json!({
                "name": "tool",
                "version": "1.0.0",
                "dependencies": { "left-pad": "^1.3.0" }
            }),
        );
        repo.write(
            "yarn.lock",
            indoc! {r#"
                # THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
                # yarn lockfile v1


                js-tokens@^4.0.0:
                  version "4.0.0"
                  resolved "https://registry.yarnpkg.com/js-tokens/-/js-tokens-4.0.0.tgz#19203fb59991df98e3a287050d4647cdeaf32499"
                  integrity sha512-tokens

                left-pad@^1.3.0:
                  version "1.3.0"
                  resolved "https://registry.yarnpkg.com/left-pad/-/left-pad-1.3.0.tgz#5b8a3a7765dfe001261dde915589e782f8c94d1e"
                  integrity sha512-lp

                loose-envify@^1.1.0:
                  version "1.4.0"
                  resolved "https://registry.yarnpkg.com/loose-envify/-/loose-envify-1.4.0.tgz#71ee51fa7be4caec1a63839f7e682d8132d30caf"
                  integrity sha512-le
                  dependencies:
                    js-tokens "^4.0.0"

                react@^18.2.0:
                  version "18.2.0"
                  resolved "https://registry.yarnpkg.com/react/-/react-18.2.0.tgz#555bd98592883255fa00de14f1151a917b5d77d5"
                  integrity sha512-react
                  dependencies:
                    loose-envify "^1.1.0"
            "#},
        );
        let graph = repo.graph();
        assert_eq!(graph.package_manager(), PackageManager::Yarn);
        let mut pruner = Pruner::new(&graph, request(&["app"], false, "out"), ui());

        assert_eq!(pruner.prune().unwrap(), names(&["app", "lib"]));

        let contents = repo.path("out/yarn.lock").read_to_string().unwrap();
        assert!(contents.starts_with("# THIS IS AN AUTOGENERATED FILE"));
        assert!(!contents.contains('\''));
        let pruned = Yarn1Lockfile::from_str(&contents).unwrap();
        for key in ["js-tokens@^4.0.0", "loose-envify@^1.1.0", "react@^18.2.0"] {
            assert!(pruned.entry(key).is_some(), "{key} missing from pruned lockfile");
        }
        assert!(pruned.entry("left-pad@^1.3.0").is_none());
    }

    const LODASH_PATCH: &str = ".yarn/patches/lodash-npm-4.17.21-6382451519.patch";
    const PATCHED_LODASH: &str = "lodash@patch:lodash@npm%3A^4.17.21#./.yarn/patches/lodash-npm-4.17.21-6382451519.patch::locator=monorepo%40workspace%3A.";

    // web depends on ui and a patched lodash, docs is unrelated
    fn berry_repo() -> Repo {
        let repo = Repo::new();
        repo.write_json(
            "package.json",
            json!({
                "name": "monorepo",
                "private": true,
                "packageManager": "yarn@3.5.0",
                "workspaces": ["apps/*", "packages/*"]
            }),
        );
        repo.write(".yarnrc.yml", "nodeLinker: node-modules\n");
        repo.write(LODASH_PATCH, "diff --git a/index.js b/index.js\n");
        repo.write_json(
            "apps/web/package.json",
            json!({
                "name": "web",
                "version": "1.0.0",
                "dependencies": {
                    "lodash": "patch:lodash@npm%3A^4.17.21#./.yarn/patches/lodash-npm-4.17.21-6382451519.patch",
                    "ui": "workspace:*"
                }
            }),
        );
        repo.write_json(
            "packages/ui/package.json",
            json!({ "name": "ui", "version": "1.0.0" }),
        );
        repo.write_json(
            "apps/docs/package.json",
            json!({
                "name": "docs",
                "version": "1.0.0",
                "dependencies": { "left-pad": "^1.3.0" }
            }),
        );
        repo.write(
            "yarn.lock",
            indoc! {r#"
                # This file is generated by running "yarn install" inside your project.
                # Manual changes might be lost - proceed with caution!

                __metadata:
                  version: 6
                  cacheKey: 8

                "docs@workspace:apps/docs":
                  version: 0.0.0-use.local
                  resolution: "docs@workspace:apps/docs"
                  dependencies:
                    left-pad: ^1.3.0
                  languageName: unknown
                  linkType: soft

                "left-pad@npm:^1.3.0":
                  version: 1.3.0
                  resolution: "left-pad@npm:1.3.0"
                  checksum: 13fa96e17b70a54836490de22d4bab706e2d2508e2b5a8f3c6e6a0fd2bdd40d1
                  languageName: node
                  linkType: hard

                "lodash@npm:^4.17.21":
                  version: 4.17.21
                  resolution: "lodash@npm:4.17.21"
                  checksum: eb835a2e51d381e561e508ce932ea50a8e5a68f4ebdd771ea240d3048244a8d1
                  languageName: node
                  linkType: hard

                "lodash@patch:lodash@npm%3A^4.17.21#./.yarn/patches/lodash-npm-4.17.21-6382451519.patch::locator=monorepo%40workspace%3A.":
                  version: 4.17.21
                  resolution: "lodash@patch:lodash@npm%3A4.17.21#./.yarn/patches/lodash-npm-4.17.21-6382451519.patch::version=4.17.21&hash=2c6e9e&locator=monorepo%40workspace%3A."
                  checksum: 0b84d1d8e7a4e5d0e3c54a2f5e4ef0a3a7e7ad3e0d0fa8e10c8c0ca37c0c9c1b
                  languageName: node
                  linkType: hard

                "monorepo@workspace:.":
                  version: 0.0.0-use.local
                  resolution: "monorepo@workspace:."
                  languageName: unknown
                  linkType: soft

                "ui@workspace:*, ui@workspace:packages/ui":
                  version: 0.0.0-use.local
                  resolution: "ui@workspace:packages/ui"
                  languageName: unknown
                  linkType: soft

                "web@workspace:apps/web":
                  version: 0.0.0-use.local
                  resolution: "web@workspace:apps/web"
                  dependencies:
                    lodash: "patch:lodash@npm%3A^4.17.21#./.yarn/patches/lodash-npm-4.17.21-6382451519.patch"
                    ui: "workspace:*"
                  languageName: unknown
                  linkType: soft
            "#},
        );
        repo
    }

    #[test]
    fn test_prune_berry() {
        let repo = berry_repo();
        let graph = repo.graph();
        assert_eq!(graph.package_manager(), PackageManager::Berry);
        let mut pruner = Pruner::new(&graph, request(&["web"], false, "out"), ui());

        assert_eq!(pruner.prune().unwrap(), names(&["ui", "web"]));

        let contents = repo.path("out/yarn.lock").read_to_string().unwrap();
        assert!(contents.starts_with("# This file is generated by running \"yarn install\""));
        assert!(contents.contains("__metadata:\n  version: 5\n  cacheKey: 8\n"));
        assert!(!contents.contains('\''));

        let pruned = BerryLockfile::load(contents.as_bytes()).unwrap();
        for key in [
            "monorepo@workspace:.",
            "web@workspace:apps/web",
            "ui@workspace:*, ui@workspace:packages/ui",
            "lodash@npm:^4.17.21",
            PATCHED_LODASH,
        ] {
            assert!(pruned.entry(key).is_some(), "{key} missing from pruned lockfile");
        }
        for key in ["docs@workspace:apps/docs", "left-pad@npm:^1.3.0"] {
            assert!(pruned.entry(key).is_none(), "{key} should have been pruned");
        }

        assert_eq!(
            repo.path(&format!("out/{LODASH_PATCH}")).read_to_string().unwrap(),
            "diff --git a/index.js b/index.js\n"
        );
        assert!(repo.path("out/.yarnrc.yml").exists());
        assert!(!repo.path("out/apps/docs").exists());
    }

    #[test]
    fn test_berry_patches_stay_in_full_tree() {
        let repo = berry_repo();
        let graph = repo.graph();
        let mut pruner = Pruner::new(&graph, request(&["web"], true, "out"), ui());

        pruner.prune().unwrap();

        assert!(repo.path(&format!("out/full/{LODASH_PATCH}")).exists());
        assert_eq!(
            repo.files("out/json"),
            ["apps/web/package.json", "package.json", "packages/ui/package.json"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_error_conversions() {
        let err = Error::from(package_graph::Error::UnknownWorkspace(WorkspaceName::from("a")));
        assert!(matches!(err, Error::UnknownWorkspace(_)));

        let err = Error::from(package_graph::Error::CyclicDependencies(vec![
            "a".into(),
            "b".into(),
        ]));
        assert!(matches!(err, Error::Graph(_)));

        let err = Error::from(package_manager::Error::UnsupportedLockfile(
            PackageManager::Pnpm,
        ));
        assert!(matches!(err, Error::Config(ConfigError::PackageManager(_))));

        let err = Error::from(prune_lockfiles::Error::MissingPackage("a".into()));
        assert!(matches!(err, Error::Lockfile(_)));
    }
}
