//! Typed paths for the pruner.
//!
//! Three flavours are used throughout the workspace:
//! - `AbsoluteSystemPathBuf`: an absolute path using the separators of the
//!   current platform, e.g. the repository root or the output directory.
//! - `AnchoredSystemPathBuf`: a path relative to some absolute anchor, almost
//!   always the repository root. Workspace directories are stored this way.
//! - `RelativeUnixPathBuf`: a relative path that always uses `/`. Lockfiles
//!   and `package.json` globs refer to workspaces with these.

mod absolute_system_path_buf;
mod anchored_system_path_buf;
mod relative_unix_path_buf;

use std::{
    io,
    path::{Path, PathBuf},
};

pub use absolute_system_path_buf::AbsoluteSystemPathBuf;
pub use anchored_system_path_buf::AnchoredSystemPathBuf;
use path_slash::{PathBufExt, PathExt};
pub use relative_unix_path_buf::RelativeUnixPathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path is not absolute: {0}")]
    NotAbsolute(PathBuf),
    #[error("Path is not relative: {0}")]
    NotRelative(PathBuf),
    #[error("Path {1} is not a descendant of {0}")]
    NotParent(String, String),
    #[error("Path is not valid unicode: {0}")]
    InvalidUnicode(PathBuf),
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
}

impl PathError {
    pub fn is_io_error(&self, kind: io::ErrorKind) -> bool {
        matches!(self, PathError::IO(err) if err.kind() == kind)
    }
}

trait IntoSystem {
    fn into_system(self) -> Result<PathBuf, PathError>;
}

trait IntoUnix {
    fn into_unix(self) -> Result<PathBuf, PathError>;
}

impl IntoSystem for &Path {
    fn into_system(self) -> Result<PathBuf, PathError> {
        let path_str = self
            .to_str()
            .ok_or_else(|| PathError::InvalidUnicode(self.to_path_buf()))?;

        Ok(PathBuf::from_slash(path_str))
    }
}

impl IntoUnix for &Path {
    /// NOTE: `into_unix` *only* converts Windows paths to Unix paths *on* a
    /// Windows system. Do not pass a Windows path on a Unix system and
    /// assume it'll be converted.
    fn into_unix(self) -> Result<PathBuf, PathError> {
        Ok(PathBuf::from(
            self.to_slash()
                .ok_or_else(|| PathError::InvalidUnicode(self.to_path_buf()))?
                .as_ref(),
        ))
    }
}
