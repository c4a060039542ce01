use prunepath::AbsoluteSystemPathBuf;
use serde::Deserialize;

use crate::package_manager::{Error, PackageManager};

pub const LOCKFILE: &str = "pnpm-lock.yaml";
pub const WORKSPACE_CONFIGURATION_PATH: &str = "pnpm-workspace.yaml";

#[derive(Debug, Deserialize)]
pub struct PnpmWorkspace {
    #[serde(default)]
    pub packages: Vec<String>,
}

pub struct PnpmDetector<'a> {
    repo_root: &'a AbsoluteSystemPathBuf,
    found: bool,
}

impl<'a> PnpmDetector<'a> {
    pub fn new(repo_root: &'a AbsoluteSystemPathBuf) -> Self {
        Self {
            repo_root,
            found: false,
        }
    }
}

impl<'a> Iterator for PnpmDetector<'a> {
    type Item = Result<PackageManager, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.found {
            return None;
        }
        self.found = true;

        let pnpm_lockfile = self.repo_root.join_component(LOCKFILE);
        pnpm_lockfile.exists().then(|| Ok(PackageManager::Pnpm))
    }
}
