use prunepath::AbsoluteSystemPathBuf;

use crate::package_manager::{Error, PackageManager};

pub const LOCKFILE: &str = "package-lock.json";

pub struct NpmDetector<'a> {
    repo_root: &'a AbsoluteSystemPathBuf,
    found: bool,
}

impl<'a> NpmDetector<'a> {
    pub fn new(repo_root: &'a AbsoluteSystemPathBuf) -> Self {
        Self {
            repo_root,
            found: false,
        }
    }
}

impl<'a> Iterator for NpmDetector<'a> {
    type Item = Result<PackageManager, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.found {
            return None;
        }
        self.found = true;

        let package_json = self.repo_root.join_component(LOCKFILE);
        package_json.exists().then(|| Ok(PackageManager::Npm))
    }
}
