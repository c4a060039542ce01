use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{AnchoredSystemPathBuf, IntoSystem, IntoUnix, PathError};

/// A relative path that always uses `/` as a separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct RelativeUnixPathBuf(PathBuf);

impl RelativeUnixPathBuf {
    /// NOTE: the conversion to forward slashes only happens on Windows. Do
    /// not pass a Windows path on a Unix system and assume it'll be
    /// converted.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PathError> {
        let path = path.into();
        if path.is_absolute() || path.to_str().map_or(false, |p| p.starts_with('/')) {
            return Err(PathError::NotRelative(path));
        }

        Ok(RelativeUnixPathBuf(path.as_path().into_unix()?))
    }

    pub(crate) fn new_unchecked(path: PathBuf) -> Self {
        RelativeUnixPathBuf(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn as_str(&self) -> Result<&str, PathError> {
        self.0
            .to_str()
            .ok_or_else(|| PathError::InvalidUnicode(self.0.clone()))
    }

    pub fn to_system_path(&self) -> Result<AnchoredSystemPathBuf, PathError> {
        AnchoredSystemPathBuf::try_from(self.0.as_path().into_system()?.as_path())
    }
}

impl fmt::Display for RelativeUnixPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}
