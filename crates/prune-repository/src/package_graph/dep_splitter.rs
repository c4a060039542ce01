use std::{collections::HashMap, fmt};

use prunepath::{AbsoluteSystemPathBuf, RelativeUnixPathBuf};

use super::{WorkspaceInfo, WorkspaceName};

/// Decides whether a dependency declared by the workspace at `workspace_dir`
/// refers to another workspace of the repository.
pub struct DependencySplitter<'a> {
    repo_root: &'a AbsoluteSystemPathBuf,
    workspace_dir: &'a AbsoluteSystemPathBuf,
    workspaces: &'a HashMap<WorkspaceName, WorkspaceInfo>,
}

impl<'a> DependencySplitter<'a> {
    pub fn new(
        repo_root: &'a AbsoluteSystemPathBuf,
        workspace_dir: &'a AbsoluteSystemPathBuf,
        workspaces: &'a HashMap<WorkspaceName, WorkspaceInfo>,
    ) -> Self {
        Self {
            repo_root,
            workspace_dir,
            workspaces,
        }
    }

    pub fn is_internal(&self, name: &str, version: &str) -> Option<WorkspaceName> {
        let workspace_specifier = WorkspacePackageSpecifier::new(version)
            .unwrap_or(WorkspacePackageSpecifier::Alias(name));
        let (workspace_name, info) = self.find_package(workspace_specifier)?;
        let is_internal = DependencyVersion::new(version).matches_workspace_package(
            info.package_json.version.as_deref().unwrap_or_default(),
            self.workspace_dir,
            self.repo_root,
        );

        is_internal.then_some(workspace_name)
    }

    // Find a package in workspace from a specifier
    fn find_package(
        &self,
        specifier: WorkspacePackageSpecifier,
    ) -> Option<(WorkspaceName, &WorkspaceInfo)> {
        match specifier {
            WorkspacePackageSpecifier::Alias(name) => {
                let workspace_name = WorkspaceName::Other(name.to_string());
                let info = self.workspaces.get(&workspace_name)?;
                Some((workspace_name, info))
            }
            WorkspacePackageSpecifier::Path(path) => {
                let path = RelativeUnixPathBuf::new(path).ok()?;
                // Paths are relative to the declaring workspace, yarn also
                // allows them to be relative to the repository root
                [self.workspace_dir, self.repo_root]
                    .into_iter()
                    .find_map(|base| {
                        let package_path = base.join_unix_path(&path).ok()?;
                        let package_path = self.repo_root.anchor(&package_path).ok()?;
                        self.workspaces
                            .iter()
                            .find(|(name, info)| {
                                **name != WorkspaceName::Root && info.package_path() == package_path
                            })
                            .map(|(name, info)| (name.clone(), info))
                    })
            }
        }
    }
}

// A parsed variant of a package dependency that uses the workspace protocol
// The specifier can either be a package name or a relative path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkspacePackageSpecifier<'a> {
    Alias(&'a str),
    Path(&'a str),
}

impl<'a> WorkspacePackageSpecifier<'a> {
    fn new(version: &'a str) -> Option<Self> {
        let version = version.strip_prefix("workspace:")?;
        match version.rsplit_once('@') {
            Some((name, "*")) | Some((name, "^")) | Some((name, "~")) => Some(Self::Alias(name)),
            // No indication of different name for the package, a slash means
            // the specifier is a directory
            Some(_) | None if version.contains('/') => Some(Self::Path(version)),
            Some(_) | None => None,
        }
    }
}

struct DependencyVersion<'a> {
    protocol: Option<&'a str>,
    version: &'a str,
}

impl<'a> DependencyVersion<'a> {
    fn new(qualified_version: &'a str) -> Self {
        qualified_version.split_once(':').map_or(
            Self {
                protocol: None,
                version: qualified_version,
            },
            |(protocol, version)| Self {
                protocol: Some(protocol),
                version,
            },
        )
    }

    fn is_external(&self) -> bool {
        // The npm protocol for yarn by default still uses the workspace package if the
        // workspace version is in a compatible semver range. See https://github.com/yarnpkg/berry/discussions/4015
        self.protocol.map_or(false, |p| p != "npm")
    }

    fn matches_workspace_package(
        &self,
        package_version: &str,
        cwd: &AbsoluteSystemPathBuf,
        root: &AbsoluteSystemPathBuf,
    ) -> bool {
        match self.protocol {
            // Workspaces with multiple versions of the same name aren't
            // supported, any workspace range refers to the workspace.
            Some("workspace") => true,
            Some("file") | Some("link") => {
                // Default to internal if we have the package but somehow cannot get the path
                RelativeUnixPathBuf::new(self.version)
                    .ok()
                    .and_then(|file_path| cwd.join_unix_path(&file_path).ok())
                    .map_or(true, |dep_path| dep_path.starts_with(root))
            }
            // Other protocols are assumed to be external references ("github:", etc)
            Some(_) if self.is_external() => false,
            _ if self.version == "*" => true,
            _ => {
                // If we got this far, then we need to check the workspace package version to
                // see it satisfies the dependencies range to determine whether
                // or not it's an internal or external dependency.
                let constraint = node_semver::Range::parse(self.version);
                let version = node_semver::Version::parse(package_version);

                // if either can't be parsed the dependency is treated as an
                // internal package reference
                constraint
                    .ok()
                    .zip(version.ok())
                    .map_or(true, |(constraint, version)| constraint.satisfies(&version))
            }
        }
    }
}

impl<'a> fmt::Display for DependencyVersion<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Some(protocol) => write!(f, "{}:{}", protocol, self.version),
            None => f.write_str(self.version),
        }
    }
}
