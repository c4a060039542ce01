//! File system operations used when staging a pruned repository.

use std::{
    fmt,
    fs::{self, DirBuilder, Metadata},
    io::{self, Write},
};

use prunepath::{AbsoluteSystemPathBuf, AnchoredSystemPathBuf, PathError};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

/// The operation that was being attempted when an IO error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Copy,
    CreateDir,
    Symlink,
    Walk,
    Persist,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Copy => "copy",
            Action::CreateDir => "create directory",
            Action::Symlink => "create symlink",
            Action::Walk => "walk",
            Action::Persist => "rename temporary file to",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: Action,
        path: AbsoluteSystemPathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Path(#[from] PathError),
}

impl Error {
    fn io(action: Action, path: &AbsoluteSystemPathBuf) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Error::Io {
            action,
            path: path.clone(),
            source,
        }
    }

    pub fn is_io_error(&self, kind: io::ErrorKind) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == kind)
    }
}

pub fn recursive_copy(src: &AbsoluteSystemPathBuf, dst: &AbsoluteSystemPathBuf) -> Result<(), Error> {
    let src_metadata = src.symlink_metadata().map_err(Error::io(Action::Read, src))?;
    if !src_metadata.is_dir() {
        return copy_file_with_type(src, src_metadata.file_type(), dst);
    }

    let walker = WalkDir::new(src.as_path()).follow_links(false);
    for entry in walker.into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            // Entries that vanish or can't be read while walking are skipped
            Err(e) if e.io_error().is_some() => continue,
            Err(e) => {
                return Err(Error::Io {
                    action: Action::Walk,
                    path: src.clone(),
                    source: e.into(),
                })
            }
        };
        let path = AbsoluteSystemPathBuf::new(entry.path())?;
        let file_type = entry.file_type();
        // Symlinked files are supported, symlinked directories are recreated
        // as empty directories and broken links are dropped.
        let is_dir_or_symlink_to_dir = if file_type.is_dir() {
            true
        } else if file_type.is_symlink() {
            match fs::metadata(path.as_path()) {
                Ok(metadata) => metadata.is_dir(),
                Err(_) => continue,
            }
        } else {
            false
        };

        let suffix = AnchoredSystemPathBuf::strip_root(src, &path)?;
        let target = dst.resolve(&suffix);
        if is_dir_or_symlink_to_dir {
            let src_metadata = entry.metadata().map_err(|e| Error::Io {
                action: Action::Read,
                path: path.clone(),
                source: e.into(),
            })?;
            make_dir_copy(&target, &src_metadata)?;
        } else {
            copy_file_with_type(&path, file_type, &target)?;
        }
    }

    Ok(())
}

fn make_dir_copy(dir: &AbsoluteSystemPathBuf, src_metadata: &Metadata) -> Result<(), Error> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::{fs::DirBuilderExt, prelude::MetadataExt};
        builder.mode(src_metadata.mode());
    }
    #[cfg(not(unix))]
    let _ = src_metadata;
    builder.recursive(true);
    builder
        .create(dir.as_path())
        .map_err(Error::io(Action::CreateDir, dir))
}

pub fn copy_file(from: &AbsoluteSystemPathBuf, to: &AbsoluteSystemPathBuf) -> Result<(), Error> {
    let metadata = from
        .symlink_metadata()
        .map_err(Error::io(Action::Read, from))?;
    copy_file_with_type(from, metadata.file_type(), to)
}

fn copy_file_with_type(
    from: &AbsoluteSystemPathBuf,
    from_type: fs::FileType,
    to: &AbsoluteSystemPathBuf,
) -> Result<(), Error> {
    to.ensure_dir().map_err(Error::io(Action::CreateDir, to))?;
    if from_type.is_symlink() {
        let target = fs::read_link(from.as_path()).map_err(Error::io(Action::Read, from))?;
        if to.symlink_metadata().is_ok() {
            fs::remove_file(to.as_path()).map_err(Error::io(Action::Write, to))?;
        }
        #[cfg(unix)]
        let link = std::os::unix::fs::symlink(&target, to.as_path());
        #[cfg(windows)]
        let link = std::os::windows::fs::symlink_file(&target, to.as_path());
        link.map_err(Error::io(Action::Symlink, to))
    } else {
        fs::copy(from.as_path(), to.as_path()).map_err(Error::io(Action::Copy, from))?;
        Ok(())
    }
}

/// Writes `contents` to `path` such that `path` either holds its previous
/// contents or all of `contents`, never a partial write.
///
/// The data goes to a temporary file in the destination directory which is
/// then renamed over `path`, a rename within one directory being atomic.
pub fn write_atomic(path: &AbsoluteSystemPathBuf, contents: &[u8]) -> Result<(), Error> {
    let dir = path
        .parent()
        .ok_or_else(|| PathError::NotParent(path.to_string(), path.to_string()))?;
    dir.create_dir_all()
        .map_err(Error::io(Action::CreateDir, &dir))?;

    let mut tmp = NamedTempFile::new_in(dir.as_path()).map_err(Error::io(Action::Write, &dir))?;
    trace!("writing {} via {}", path, tmp.path().display());
    tmp.write_all(contents)
        .and_then(|_| tmp.flush())
        .map_err(Error::io(Action::Write, path))?;
    tmp.persist(path.as_path())
        .map_err(|e| Error::io(Action::Persist, path)(e.error))?;

    Ok(())
}
