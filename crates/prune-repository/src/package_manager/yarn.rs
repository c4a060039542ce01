use node_semver::{Range, Version};
use prunepath::AbsoluteSystemPathBuf;

use crate::package_manager::{Error, PackageManager};

pub const LOCKFILE: &str = "yarn.lock";

// Only berry lockfiles start with a metadata block
const BERRY_METADATA: &str = "__metadata:";

pub struct YarnDetector<'a> {
    repo_root: &'a AbsoluteSystemPathBuf,
    found: bool,
}

impl<'a> YarnDetector<'a> {
    pub fn new(repo_root: &'a AbsoluteSystemPathBuf) -> Self {
        Self {
            repo_root,
            found: false,
        }
    }

    pub fn detect_berry_or_yarn(version: &Version) -> Result<PackageManager, Error> {
        let berry_constraint: Range = ">=2.0.0-0".parse()?;
        if berry_constraint.satisfies(version) {
            Ok(PackageManager::Berry)
        } else {
            Ok(PackageManager::Yarn)
        }
    }

    /// Tells the two lockfile formats apart by their contents
    pub fn sniff_lockfile(contents: &str) -> PackageManager {
        if contents
            .lines()
            .any(|line| line.trim_end() == BERRY_METADATA)
        {
            PackageManager::Berry
        } else {
            PackageManager::Yarn
        }
    }
}

impl<'a> Iterator for YarnDetector<'a> {
    type Item = Result<PackageManager, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.found {
            return None;
        }
        self.found = true;

        let lockfile = self.repo_root.join_component(LOCKFILE);
        if !lockfile.exists() {
            return None;
        }
        Some(
            lockfile
                .read_to_string()
                .map(|contents| Self::sniff_lockfile(&contents))
                .map_err(|source| Error::Io {
                    path: lockfile,
                    source,
                }),
        )
    }
}
