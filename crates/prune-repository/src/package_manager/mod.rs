mod dialect;
mod npm;
mod pnpm;
mod yarn;

use std::{
    fmt::{self, Display},
    io,
};

use glob::{MatchOptions, Pattern};
use itertools::{Either, Itertools};
use lazy_static::lazy_static;
use miette::Diagnostic;
use prune_lockfiles::{BerryLockfile, Lockfile, LockfileSubset, NpmLockfile, Yarn1Lockfile};
use prunepath::{AbsoluteSystemPathBuf, PathError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use self::dialect::{yarn_fixup, YARN_BERRY_HEADER, YARN_CLASSIC_HEADER};
use self::{npm::NpmDetector, pnpm::PnpmDetector, yarn::YarnDetector};
use crate::package_json::PackageJson;

#[derive(Debug, Deserialize)]
struct PackageJsonWorkspaces {
    workspaces: Workspaces,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
enum Workspaces {
    TopLevel(Vec<String>),
    Nested { packages: Vec<String> },
}

impl From<Workspaces> for Vec<String> {
    fn from(value: Workspaces) -> Self {
        match value {
            Workspaces::TopLevel(packages) => packages,
            Workspaces::Nested { packages } => packages,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Berry,
    Npm,
    Pnpm,
    Yarn,
}

impl Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Berry => write!(f, "berry"),
            PackageManager::Npm => write!(f, "npm"),
            PackageManager::Pnpm => write!(f, "pnpm"),
            PackageManager::Yarn => write!(f, "yarn"),
        }
    }
}

/// Globs describing which directories are workspaces
#[derive(Debug, Clone)]
pub struct WorkspaceGlobs {
    pub raw_inclusions: Vec<String>,
    pub raw_exclusions: Vec<String>,
    inclusions: Vec<Pattern>,
    exclusions: Vec<Pattern>,
}

impl PartialEq for WorkspaceGlobs {
    fn eq(&self, other: &Self) -> bool {
        // Use the literals for comparison, not the compiled globs
        self.raw_inclusions == other.raw_inclusions && self.raw_exclusions == other.raw_exclusions
    }
}

impl Eq for WorkspaceGlobs {}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn fix_glob_pattern(raw: &str) -> String {
    let raw = raw.strip_prefix("./").unwrap_or(raw);
    raw.trim_end_matches('/').to_string()
}

fn compile(raw: &[String]) -> Result<Vec<Pattern>, Error> {
    raw.iter()
        .map(|glob| {
            Pattern::new(glob).map_err(|source| Error::Glob {
                glob: glob.clone(),
                source,
            })
        })
        .collect()
}

impl WorkspaceGlobs {
    pub fn new<S: AsRef<str>>(inclusions: &[S], exclusions: &[S]) -> Result<Self, Error> {
        let raw_inclusions = inclusions
            .iter()
            .map(|s| fix_glob_pattern(s.as_ref()))
            .collect::<Vec<_>>();
        let raw_exclusions = exclusions
            .iter()
            .map(|s| fix_glob_pattern(s.as_ref()))
            .collect::<Vec<_>>();
        Ok(Self {
            inclusions: compile(&raw_inclusions)?,
            exclusions: compile(&raw_exclusions)?,
            raw_inclusions,
            raw_exclusions,
        })
    }

    /// Checks if the given `target` directory matches this `WorkspaceGlobs`.
    ///
    /// Errors:
    /// This function returns an Err if `root` is not a valid anchor for
    /// `target`
    pub fn target_is_workspace(
        &self,
        root: &AbsoluteSystemPathBuf,
        target: &AbsoluteSystemPathBuf,
    ) -> Result<bool, PathError> {
        let search_value = root.anchor(target)?.to_unix()?;
        let search_value = search_value.as_str()?;

        let includes = self
            .inclusions
            .iter()
            .any(|glob| glob.matches_with(search_value, MATCH_OPTIONS));
        let excludes = self
            .exclusions
            .iter()
            .any(|glob| glob.matches_with(search_value, MATCH_OPTIONS));

        Ok(includes && !excludes)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(
        "no recognized package manager found in {0}: expected one of package-lock.json, \
         yarn.lock or pnpm-lock.yaml"
    )]
    #[diagnostic(help("run your package manager's install command to create a lockfile"))]
    NoPackageManager(AbsoluteSystemPathBuf),
    #[error(
        "We could not parse the packageManager field in package.json, expected: {0}, received: {1}"
    )]
    InvalidPackageManager(String, String),
    #[error("could not find {package_manager} workspaces in {path}")]
    MissingWorkspaces {
        package_manager: PackageManager,
        path: AbsoluteSystemPathBuf,
    },
    #[error("unable to read {path}: {source}")]
    Io {
        path: AbsoluteSystemPathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid workspace glob {glob}: {source}")]
    Glob {
        glob: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("yaml parsing error: {0}")]
    ParsingYaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Semver(#[from] node_semver::SemverError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("{0} lockfiles cannot be read or written")]
    UnsupportedLockfile(PackageManager),
    #[error(transparent)]
    Lockfile(#[from] prune_lockfiles::Error),
}

impl From<std::convert::Infallible> for Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Path(PathError::IO(source))
    }
}

lazy_static! {
    static ref PACKAGE_MANAGER_PATTERN: Regex =
        Regex::new(r"^(?P<manager>npm|pnpm|yarn)@(?P<version>\d+\.\d+\.\d+(-.+)?)$")
            .expect("valid package manager pattern");
}

impl PackageManager {
    /// Whether a repository managed by this package manager can be pruned
    pub fn can_prune(&self) -> bool {
        matches!(
            self,
            PackageManager::Npm | PackageManager::Yarn | PackageManager::Berry
        )
    }

    pub fn lockfile_name(&self) -> &'static str {
        match self {
            PackageManager::Npm => npm::LOCKFILE,
            PackageManager::Pnpm => pnpm::LOCKFILE,
            PackageManager::Yarn | PackageManager::Berry => yarn::LOCKFILE,
        }
    }

    pub fn lockfile_path(&self, repo_root: &AbsoluteSystemPathBuf) -> AbsoluteSystemPathBuf {
        repo_root.join_component(self.lockfile_name())
    }

    pub fn workspace_configuration_path(&self) -> Option<&'static str> {
        match self {
            PackageManager::Pnpm => Some(pnpm::WORKSPACE_CONFIGURATION_PATH),
            PackageManager::Npm | PackageManager::Berry | PackageManager::Yarn => None,
        }
    }

    pub fn workspace_glob_source(&self, repo_root: &AbsoluteSystemPathBuf) -> AbsoluteSystemPathBuf {
        repo_root.join_component(self.workspace_configuration_path().unwrap_or("package.json"))
    }

    /// Returns the set of globs for the workspace.
    pub fn get_workspace_globs(
        &self,
        repo_root: &AbsoluteSystemPathBuf,
    ) -> Result<WorkspaceGlobs, Error> {
        let (inclusions, mut exclusions) = self.get_configured_workspace_globs(repo_root)?;
        exclusions.extend(self.get_default_exclusions());
        WorkspaceGlobs::new(&inclusions, &exclusions)
    }

    pub fn get_default_exclusions(&self) -> impl Iterator<Item = String> {
        let ignores = match self {
            PackageManager::Pnpm => ["**/node_modules/**", "**/bower_components/**"].as_slice(),
            PackageManager::Npm | PackageManager::Yarn => ["**/node_modules/**"].as_slice(),
            PackageManager::Berry => ["**/node_modules/**", "**/.git/**", "**/.yarn/**"].as_slice(),
        };
        ignores.iter().map(|s| s.to_string())
    }

    fn get_configured_workspace_globs(
        &self,
        repo_root: &AbsoluteSystemPathBuf,
    ) -> Result<(Vec<String>, Vec<String>), Error> {
        let source = self.workspace_glob_source(repo_root);
        let contents = source.read_to_string().map_err(|source_err| Error::Io {
            path: source.clone(),
            source: source_err,
        })?;
        let missing = || Error::MissingWorkspaces {
            package_manager: *self,
            path: source.clone(),
        };
        let globs: Vec<String> = match self {
            PackageManager::Pnpm => {
                let workspace: pnpm::PnpmWorkspace = serde_yaml::from_str(&contents)?;
                workspace.packages
            }
            PackageManager::Npm | PackageManager::Yarn | PackageManager::Berry => {
                let package_json: PackageJsonWorkspaces =
                    serde_json::from_str(&contents).map_err(|_| missing())?;
                package_json.workspaces.into()
            }
        };
        if globs.is_empty() {
            return Err(missing());
        }

        Ok(globs.into_iter().partition_map(|glob| {
            if let Some(exclusion) = glob.strip_prefix('!') {
                Either::Right(exclusion.to_string())
            } else {
                Either::Left(glob)
            }
        }))
    }

    /// Works out which package manager owns the repository.
    ///
    /// Lockfiles are checked in a fixed order and the first one found wins.
    /// For yarn the `packageManager` field of the root package.json, if
    /// present, decides between classic and berry.
    pub fn get_package_manager(
        repo_root: &AbsoluteSystemPathBuf,
        pkg: Option<&PackageJson>,
    ) -> Result<Self, Error> {
        let declared = match pkg {
            Some(package_json) => Self::read_package_manager(package_json)?,
            None => None,
        };
        let detected = Self::detect_package_manager(repo_root)?;
        let package_manager = match (detected, declared) {
            (
                PackageManager::Yarn | PackageManager::Berry,
                Some(declared @ (PackageManager::Yarn | PackageManager::Berry)),
            ) => declared,
            (detected, declared) => {
                if let Some(declared) = declared.filter(|declared| *declared != detected) {
                    debug!("packageManager field declares {declared} but found a {detected} lockfile");
                }
                detected
            }
        };
        Ok(package_manager)
    }

    // Attempts to read the package manager from the package.json
    fn read_package_manager(pkg: &PackageJson) -> Result<Option<Self>, Error> {
        let Some(package_manager) = &pkg.package_manager else {
            return Ok(None);
        };

        let (manager, version) = Self::parse_package_manager_string(package_manager)?;
        let manager = match manager {
            "npm" => PackageManager::Npm,
            "pnpm" => PackageManager::Pnpm,
            _ => YarnDetector::detect_berry_or_yarn(&version.parse()?)?,
        };
        Ok(Some(manager))
    }

    fn detect_package_manager(repo_root: &AbsoluteSystemPathBuf) -> Result<PackageManager, Error> {
        NpmDetector::new(repo_root)
            .chain(YarnDetector::new(repo_root))
            .chain(PnpmDetector::new(repo_root))
            .next()
            .unwrap_or_else(|| Err(Error::NoPackageManager(repo_root.clone())))
    }

    pub(crate) fn parse_package_manager_string(manager: &str) -> Result<(&str, &str), Error> {
        let invalid =
            || Error::InvalidPackageManager(PACKAGE_MANAGER_PATTERN.to_string(), manager.to_string());
        let captures = PACKAGE_MANAGER_PATTERN.captures(manager).ok_or_else(invalid)?;
        match (captures.name("manager"), captures.name("version")) {
            (Some(manager), Some(version)) => Ok((manager.as_str(), version.as_str())),
            _ => Err(invalid()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn read_lockfile(
        &self,
        repo_root: &AbsoluteSystemPathBuf,
    ) -> Result<Box<dyn Lockfile>, Error> {
        let lockfile_path = self.lockfile_path(repo_root);
        let contents = lockfile_path.read().map_err(|source| Error::Io {
            path: lockfile_path.clone(),
            source,
        })?;
        self.parse_lockfile(&contents)
    }

    #[tracing::instrument(skip(self, contents))]
    pub fn parse_lockfile(&self, contents: &[u8]) -> Result<Box<dyn Lockfile>, Error> {
        Ok(match self {
            PackageManager::Npm => Box::new(NpmLockfile::load(contents)?),
            PackageManager::Yarn => Box::new(Yarn1Lockfile::from_bytes(contents)?),
            PackageManager::Berry => {
                let lockfile = BerryLockfile::load(contents)?;
                let metadata = lockfile.metadata();
                if metadata.version != dialect::YARN_BERRY_METADATA_VERSION
                    || metadata.cache_key.as_deref() != Some(dialect::YARN_BERRY_CACHE_KEY)
                {
                    warn!(
                        "yarn.lock has metadata version {} and cacheKey {}, the pruned lockfile \
                         will be written with version {} and cacheKey {}",
                        metadata.version,
                        metadata.cache_key.as_deref().unwrap_or("<none>"),
                        dialect::YARN_BERRY_METADATA_VERSION,
                        dialect::YARN_BERRY_CACHE_KEY,
                    );
                }
                Box::new(lockfile)
            }
            PackageManager::Pnpm => return Err(Error::UnsupportedLockfile(*self)),
        })
    }

    /// Encodes `subset` in the exact on disk format of this package manager.
    pub fn encode_lockfile(
        &self,
        lockfile: &dyn Lockfile,
        subset: &LockfileSubset,
    ) -> Result<Vec<u8>, Error> {
        let generic = lockfile.encode_subset(subset)?;
        let header = match self {
            PackageManager::Npm => return Ok(generic),
            PackageManager::Yarn => YARN_CLASSIC_HEADER,
            PackageManager::Berry => YARN_BERRY_HEADER,
            PackageManager::Pnpm => return Err(Error::UnsupportedLockfile(*self)),
        };
        let generic = String::from_utf8_lossy(&generic);
        Ok(yarn_fixup(header, &generic).into_bytes())
    }
}
