use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{AbsoluteSystemPathBuf, IntoSystem, IntoUnix, PathError, RelativeUnixPathBuf};

/// A path relative to an anchor, usually the repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct AnchoredSystemPathBuf(PathBuf);

impl TryFrom<&Path> for AnchoredSystemPathBuf {
    type Error = PathError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        if path.is_absolute() {
            return Err(PathError::NotRelative(path.to_path_buf()));
        }

        Ok(AnchoredSystemPathBuf(path.into_system()?))
    }
}

impl AnchoredSystemPathBuf {
    pub fn strip_root(
        root: &AbsoluteSystemPathBuf,
        path: &AbsoluteSystemPathBuf,
    ) -> Result<Self, PathError> {
        let stripped_path = path
            .as_path()
            .strip_prefix(root.as_path())
            .map_err(|_| PathError::NotParent(root.to_string(), path.to_string()))?
            .to_path_buf();

        Ok(AnchoredSystemPathBuf(stripped_path))
    }

    pub fn from_raw(raw: impl AsRef<str>) -> Result<Self, PathError> {
        Path::new(raw.as_ref()).try_into()
    }

    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .parent()
            .map(|p| AnchoredSystemPathBuf(p.to_path_buf()))
    }

    pub fn join_component(&self, segment: &str) -> Self {
        AnchoredSystemPathBuf(self.0.join(segment))
    }

    pub fn to_str(&self) -> Result<&str, PathError> {
        self.0
            .to_str()
            .ok_or_else(|| PathError::InvalidUnicode(self.0.clone()))
    }

    pub fn to_unix(&self) -> Result<RelativeUnixPathBuf, PathError> {
        Ok(RelativeUnixPathBuf::new_unchecked(
            self.0.as_path().into_unix()?,
        ))
    }
}

impl fmt::Display for AnchoredSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}
