use std::{
    fmt, fs, io,
    path::{Component, Path, PathBuf},
};

use serde::Serialize;

use crate::{AnchoredSystemPathBuf, IntoSystem, PathError, RelativeUnixPathBuf};

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AbsoluteSystemPathBuf(PathBuf);

impl AbsoluteSystemPathBuf {
    /// Create a new AbsoluteSystemPathBuf from `unchecked_path`.
    /// Confirms that `unchecked_path` is absolute and converts it to a system
    /// path.
    ///
    /// ```
    /// use prunepath::AbsoluteSystemPathBuf;
    /// #[cfg(not(windows))]
    /// {
    ///   assert!(AbsoluteSystemPathBuf::new("/repo").is_ok());
    ///   assert!(AbsoluteSystemPathBuf::new("repo").is_err());
    /// }
    /// ```
    pub fn new(unchecked_path: impl Into<PathBuf>) -> Result<Self, PathError> {
        let unchecked_path = unchecked_path.into();
        if !unchecked_path.is_absolute() {
            return Err(PathError::NotAbsolute(unchecked_path));
        }

        let system_path = unchecked_path.as_path().into_system()?;
        Ok(AbsoluteSystemPathBuf(system_path))
    }

    pub fn cwd() -> Result<Self, PathError> {
        Self::new(std::env::current_dir()?)
    }

    /// Resolves `unknown` against `base` if it is relative, otherwise uses it
    /// as is.
    pub fn from_unknown(base: &AbsoluteSystemPathBuf, unknown: impl Into<PathBuf>) -> Self {
        let unknown = unknown.into();
        if unknown.is_absolute() {
            Self(unknown)
        } else {
            Self(base.0.join(unknown))
        }
    }

    /// Anchors `path` at `self`.
    ///
    /// ```
    /// use prunepath::AbsoluteSystemPathBuf;
    /// #[cfg(not(windows))]
    /// {
    ///   let base = AbsoluteSystemPathBuf::new("/repo").unwrap();
    ///   let web = AbsoluteSystemPathBuf::new("/repo/apps/web").unwrap();
    ///   assert_eq!(base.anchor(&web).unwrap().to_str().unwrap(), "apps/web");
    /// }
    /// ```
    pub fn anchor(&self, path: &AbsoluteSystemPathBuf) -> Result<AnchoredSystemPathBuf, PathError> {
        AnchoredSystemPathBuf::strip_root(self, path)
    }

    /// Resolves `path` with `self` as anchor.
    pub fn resolve(&self, path: &AnchoredSystemPathBuf) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf(self.0.join(path.as_path()))
    }

    pub fn join_component(&self, segment: &str) -> AbsoluteSystemPathBuf {
        debug_assert!(!segment.contains(std::path::MAIN_SEPARATOR));
        AbsoluteSystemPathBuf(self.0.join(segment))
    }

    pub fn join_components(&self, segments: &[&str]) -> AbsoluteSystemPathBuf {
        let mut path = self.0.clone();
        path.extend(segments);
        AbsoluteSystemPathBuf(path)
    }

    /// Joins a unix style relative path, e.g. a `file:../lib` dependency,
    /// and cleans the result.
    pub fn join_unix_path(&self, path: &RelativeUnixPathBuf) -> Result<Self, PathError> {
        Ok(self.resolve(&path.to_system_path()?).clean())
    }

    /// Lexically removes `.` and `..` components.
    pub fn clean(&self) -> Self {
        let mut cleaned = PathBuf::new();
        for component in self.0.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    cleaned.pop();
                }
                other => cleaned.push(other),
            }
        }
        AbsoluteSystemPathBuf(cleaned)
    }

    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .parent()
            .map(|p| AbsoluteSystemPathBuf(p.to_path_buf()))
    }

    pub fn starts_with(&self, base: &AbsoluteSystemPathBuf) -> bool {
        self.0.starts_with(&base.0)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }

    pub fn to_str(&self) -> Result<&str, PathError> {
        self.0
            .to_str()
            .ok_or_else(|| PathError::InvalidUnicode(self.0.clone()))
    }

    pub fn exists(&self) -> bool {
        self.0.exists()
    }

    pub fn is_dir(&self) -> bool {
        self.0.is_dir()
    }

    pub fn symlink_metadata(&self) -> Result<fs::Metadata, io::Error> {
        fs::symlink_metadata(&self.0)
    }

    pub fn create_dir_all(&self) -> Result<(), io::Error> {
        fs::create_dir_all(&self.0)
    }

    /// Creates the parent directory of `self` if it doesn't exist yet.
    pub fn ensure_dir(&self) -> Result<(), io::Error> {
        if let Some(parent) = self.0.parent() {
            fs::create_dir_all(parent)
        } else {
            Ok(())
        }
    }

    pub fn read(&self) -> Result<Vec<u8>, io::Error> {
        fs::read(&self.0)
    }

    pub fn read_to_string(&self) -> Result<String, io::Error> {
        fs::read_to_string(&self.0)
    }

    pub fn create_with_contents(&self, contents: impl AsRef<[u8]>) -> Result<(), io::Error> {
        fs::write(&self.0, contents)
    }
}

impl AsRef<Path> for AbsoluteSystemPathBuf {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

impl fmt::Display for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl fmt::Debug for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[cfg(not(windows))]
    #[test_case("/repo", true ; "absolute")]
    #[test_case("repo", false ; "relative")]
    #[test_case("./repo/../other", false ; "dotted relative")]
    fn test_new(path: &str, is_ok: bool) {
        assert_eq!(AbsoluteSystemPathBuf::new(path).is_ok(), is_ok);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_anchor_and_resolve() {
        let root = AbsoluteSystemPathBuf::new("/repo").unwrap();
        let web = root.join_components(&["apps", "web"]);
        let anchored = root.anchor(&web).unwrap();
        assert_eq!(anchored.to_str().unwrap(), "apps/web");
        assert_eq!(root.resolve(&anchored), web);

        let outside = AbsoluteSystemPathBuf::new("/other").unwrap();
        assert!(matches!(
            root.anchor(&outside),
            Err(PathError::NotParent(..))
        ));
    }

    #[cfg(not(windows))]
    #[test_case("/repo/apps/web", "../../packages/ui", "/repo/packages/ui" ; "sibling")]
    #[test_case("/repo/apps/web", "./lib", "/repo/apps/web/lib" ; "current dir")]
    #[test_case("/repo", "../../../etc", "/etc" ; "escapes root")]
    fn test_join_unix_path(base: &str, relative: &str, expected: &str) {
        let base = AbsoluteSystemPathBuf::new(base).unwrap();
        let joined = base
            .join_unix_path(&RelativeUnixPathBuf::new(relative).unwrap())
            .unwrap();
        assert_eq!(joined, AbsoluteSystemPathBuf::new(expected).unwrap());
    }

    #[test]
    fn test_ensure_dir_creates_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path()).unwrap();
        let file = root.join_components(&["a", "b", "package.json"]);
        file.ensure_dir().unwrap();
        assert!(root.join_components(&["a", "b"]).is_dir());
        assert!(!file.exists());
    }
}
