//! Filesystem primitives used by resolution and commit.
//!
//! Every failure is returned as `LibraryError::Io` carrying the path that
//! failed. Removal helpers treat an absent path as already removed.

use crate::error::{LibraryError, LibraryResult};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

/// Removes a file, symlink or directory tree. No-op if `path` does not exist.
pub(crate) fn remove_path(path: &Path) -> LibraryResult<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(LibraryError::io(path, e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LibraryError::io(path, e)),
    }
}

/// Whether anything (file, directory or dangling symlink) exists at `path`.
pub(crate) fn exists(path: &Path) -> LibraryResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LibraryError::io(path, e)),
    }
}

/// Whether `path` is an existing regular file (symlinks followed).
pub(crate) fn is_regular_file(path: &Path) -> LibraryResult<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LibraryError::io(path, e)),
    }
}

/// Copies one file, replacing `dst`, and carries over permissions and
/// modification time. A symbolic link at `src` is refused.
pub(crate) fn copy_file(src: &Path, dst: &Path) -> LibraryResult<()> {
    reject_symlink(src)?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| LibraryError::io(parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| LibraryError::io(dst, e))?;

    let modified = fs::metadata(src)
        .and_then(|meta| meta.modified())
        .map_err(|e| LibraryError::io(src, e))?;
    open_for_times(dst)
        .and_then(|file| file.set_modified(modified))
        .map_err(|e| LibraryError::io(dst, e))?;
    Ok(())
}

/// Opens `path` with enough access to change its timestamps, including
/// when the copied permissions made it read-only.
#[cfg(windows)]
fn open_for_times(path: &Path) -> std::io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;
    const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;
    File::options().access_mode(FILE_WRITE_ATTRIBUTES).open(path)
}

#[cfg(not(windows))]
fn open_for_times(path: &Path) -> std::io::Result<File> {
    // The owner may set times through a read-only descriptor.
    File::options()
        .write(true)
        .open(path)
        .or_else(|_| File::open(path))
}

/// Copies `src` onto `dst`, recursing into directories.
///
/// Files present in both are replaced; entries only present under `dst` are
/// left alone. A file in `src` whose counterpart in `dst` is a directory
/// (or the reverse) is an error, not a silent replacement. Symbolic links
/// anywhere under `src` are refused.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> LibraryResult<()> {
    reject_symlink(src)?;
    let meta = fs::metadata(src).map_err(|e| LibraryError::io(src, e))?;
    if !meta.is_dir() {
        return copy_file(src, dst);
    }

    match fs::metadata(dst) {
        Ok(existing) if !existing.is_dir() => {
            return Err(LibraryError::access(dst, "expected a directory, found a file"));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(dst).map_err(|e| LibraryError::io(dst, e))?;
        }
        Err(e) => return Err(LibraryError::io(dst, e)),
    }

    for entry in fs::read_dir(src).map_err(|e| LibraryError::io(src, e))? {
        let entry = entry.map_err(|e| LibraryError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| LibraryError::io(&from, e))?;
        if file_type.is_symlink() {
            return Err(LibraryError::access(&from, "symbolic links are not copied"));
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }

    fs::set_permissions(dst, meta.permissions()).map_err(|e| LibraryError::io(dst, e))?;
    Ok(())
}

fn reject_symlink(path: &Path) -> LibraryResult<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| LibraryError::io(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(LibraryError::access(path, "symbolic links are not copied"));
    }
    Ok(())
}
