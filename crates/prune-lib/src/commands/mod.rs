use prunepath::AbsoluteSystemPathBuf;

use crate::ui::UI;

pub(crate) mod prune;

#[derive(Debug)]
pub struct CommandBase {
    pub repo_root: AbsoluteSystemPathBuf,
    pub ui: UI,
}

impl CommandBase {
    pub fn new(repo_root: AbsoluteSystemPathBuf, ui: UI) -> Self {
        Self { repo_root, ui }
    }

    fn root_package_json_path(&self) -> AbsoluteSystemPathBuf {
        self.repo_root.join_component("package.json")
    }
}
